use super::Fetch;
use crate::error::{Result, ScrapeError};
use chrono::NaiveDate;
use std::io::{Cursor, Read};
use tracing::debug;
use zip::ZipArchive;

/// A downloaded ZIP archive held in memory.
pub struct ZipSource {
    bytes: Vec<u8>,
    archive: ZipArchive<Cursor<Vec<u8>>>,
}

impl ZipSource {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let archive = ZipArchive::new(Cursor::new(bytes.clone()))?;
        Ok(Self { bytes, archive })
    }

    /// Raw archive bytes as downloaded.
    pub fn raw(&self) -> &[u8] {
        &self.bytes
    }

    pub fn member_names(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }

    pub fn member_bytes(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut member = self.archive.by_name(name)?;
        let mut buffer = Vec::with_capacity(member.size() as usize);
        member.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    /// Calendar date of the member's last-modified timestamp.
    pub fn member_last_modified(&mut self, name: &str) -> Result<NaiveDate> {
        let member = self.archive.by_name(name)?;
        let stamp = member.last_modified();
        NaiveDate::from_ymd_opt(
            i32::from(stamp.year()),
            u32::from(stamp.month()),
            u32::from(stamp.day()),
        )
        .ok_or_else(|| ScrapeError::value(format!("invalid modification date for {}", name)))
    }
}

pub fn get_zip(fetch: &dyn Fetch, url: &str, use_cache: bool) -> Result<ZipSource> {
    debug!("Fetching ZIP archive {}", url);
    let bytes = fetch.fetch_bytes(url, use_cache)?;
    ZipSource::from_bytes(bytes)
}


#[cfg(test)]
mod tests {
    use super::test_support::build_zip;
    use super::*;
    use crate::fetch::StaticFetcher;

    #[test]
    fn test_member_access() {
        let bytes = build_zip(&[("demographics.csv", "race,Deaths\n")], (2020, 6, 30));
        let fetcher = StaticFetcher::new().with_body("https://example.com/data.zip", bytes);

        let mut zip = get_zip(&fetcher, "https://example.com/data.zip", true).unwrap();
        assert_eq!(zip.member_names(), vec!["demographics.csv"]);
        assert_eq!(zip.member_bytes("demographics.csv").unwrap(), b"race,Deaths\n");
        assert_eq!(
            zip.member_last_modified("demographics.csv").unwrap(),
            NaiveDate::from_ymd_opt(2020, 6, 30).unwrap()
        );
    }

    #[test]
    fn test_missing_member_is_zip_error() {
        let bytes = build_zip(&[("a.csv", "x")], (2020, 1, 1));
        let mut zip = ZipSource::from_bytes(bytes).unwrap();
        assert!(matches!(zip.member_bytes("b.csv"), Err(ScrapeError::Zip(_))));
    }

    #[test]
    fn test_not_a_zip() {
        assert!(ZipSource::from_bytes(b"not a zip".to_vec()).is_err());
    }
}
