use super::Fetch;
use crate::error::{Result, ScrapeError};
use scraper::{Html, Selector};
use url::Url;

/// Download a page (never cached) and parse it.
pub fn url_to_soup(fetch: &dyn Fetch, url: &str) -> Result<Html> {
    let body = fetch.fetch_text(url, false)?;
    Ok(Html::parse_document(&body))
}

/// Absolute URL of the first `<a>` whose `title` attribute equals `title`,
/// resolved against `base`.
pub fn find_link_by_title(document: &Html, base: &str, title: &str) -> Result<String> {
    let selector = Selector::parse("a[title]")
        .map_err(|e| ScrapeError::value(format!("invalid selector: {:?}", e)))?;

    let href = document
        .select(&selector)
        .filter(|a| a.value().attr("title") == Some(title))
        .find_map(|a| a.value().attr("href"))
        .filter(|href| !href.trim().is_empty())
        .ok_or_else(|| ScrapeError::value(format!("Unable to find {} link", title)))?;

    let resolved = Url::parse(base)?.join(href.trim())?;
    Ok(resolved.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StaticFetcher;

    const PAGE: &str = r#"
        <html><body>
          <a href="/other" title="Something else">x</a>
          <a href="/globalassets/covid19/dailies/state_report-2020-06-30-final.pdf"
             title="COVID-19 Data - Daily Report Archive">Daily report</a>
        </body></html>"#;

    #[test]
    fn test_find_link_resolves_relative_href() {
        let fetcher = StaticFetcher::new().with_body("https://floridadisaster.org/covid19/", PAGE);
        let soup = url_to_soup(&fetcher, "https://floridadisaster.org/covid19/").unwrap();

        let link = find_link_by_title(
            &soup,
            "https://floridadisaster.org/covid19/",
            "COVID-19 Data - Daily Report Archive",
        )
        .unwrap();

        assert_eq!(
            link,
            "https://floridadisaster.org/globalassets/covid19/dailies/state_report-2020-06-30-final.pdf"
        );
    }

    #[test]
    fn test_missing_link_is_value_error() {
        let soup = Html::parse_document("<html><body></body></html>");
        let err = find_link_by_title(&soup, "https://example.com/", "Nope").unwrap_err();
        assert_eq!(err.class_name(), "Value");
        assert_eq!(err.to_string(), "Unable to find Nope link");
    }
}
