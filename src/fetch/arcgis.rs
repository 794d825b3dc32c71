//! ArcGIS feature-service queries.
//!
//! A service is addressed by its feature layer collection (item) id and a
//! layer name. The item metadata supplies the service URL and the last
//! modification time, which is used as the report date.

use super::Fetch;
use crate::error::{Result, ScrapeError};
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use url::Url;

pub const ITEM_URL_TEMPLATE: &str = "https://www.arcgis.com/sharing/rest/content/items/{flc_id}";

/// Descriptor of one geoservice query.
#[derive(Debug, Clone, Default)]
pub struct GeoService {
    pub flc_id: String,
    pub layer_name: String,
    /// Plain field names, or statistics in the form `sum(FIELD) as ALIAS`.
    pub out_fields: Vec<String>,
    pub where_clause: Option<String>,
    pub group_by: Option<String>,
}

pub type Attributes = Map<String, Value>;

#[derive(Debug, Deserialize)]
struct ItemInfo {
    url: String,
    /// Milliseconds since the epoch.
    modified: i64,
}

#[derive(Debug, Deserialize)]
struct ServiceInfo {
    #[serde(default)]
    layers: Vec<LayerInfo>,
}

#[derive(Debug, Deserialize)]
struct LayerInfo {
    id: u32,
    name: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    features: Vec<Feature>,
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    attributes: Attributes,
}

/// Run the query; returns the service's last-modified date and one
/// attribute map per result feature.
pub fn query_geoservice(fetch: &dyn Fetch, service: &GeoService) -> Result<(NaiveDate, Vec<Attributes>)> {
    let item_url = item_url(&service.flc_id)?;
    debug!("Looking up ArcGIS item {}", service.flc_id);
    let item: ItemInfo = serde_json::from_slice(&fetch.fetch_bytes(item_url.as_str(), false)?)?;
    let date = modified_date(item.modified)?;

    let service_url = Url::parse_with_params(&item.url, &[("f", "json")])?;
    let info: ServiceInfo = serde_json::from_slice(&fetch.fetch_bytes(service_url.as_str(), false)?)?;
    let layer = info
        .layers
        .iter()
        .find(|layer| layer.name == service.layer_name)
        .ok_or_else(|| ScrapeError::MissingRow {
            key: format!("layer {}", service.layer_name),
        })?;

    let query_url = build_query_url(&item.url, layer.id, service)?;
    info!("Querying ArcGIS layer {} ({})", service.layer_name, layer.id);
    let response: QueryResponse = serde_json::from_slice(&fetch.fetch_bytes(query_url.as_str(), false)?)?;
    if let Some(error) = response.error {
        return Err(ScrapeError::value(format!("ArcGIS query failed: {}", error)));
    }

    Ok((date, response.features.into_iter().map(|f| f.attributes).collect()))
}

fn item_url(flc_id: &str) -> Result<Url> {
    let base = ITEM_URL_TEMPLATE.replace("{flc_id}", flc_id);
    Ok(Url::parse_with_params(&base, &[("f", "json")])?)
}

fn modified_date(millis: i64) -> Result<NaiveDate> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|stamp| stamp.date_naive())
        .ok_or_else(|| ScrapeError::value(format!("invalid modification time {}", millis)))
}

pub(crate) fn build_query_url(service_url: &str, layer_id: u32, service: &GeoService) -> Result<Url> {
    let statistic = Regex::new(r"(?i)^\s*(\w+)\((\w+)\)\s+as\s+(\w+)\s*$")
        .map_err(|e| ScrapeError::value(e.to_string()))?;

    let mut plain_fields = Vec::new();
    let mut statistics = Vec::new();
    for field in &service.out_fields {
        match statistic.captures(field) {
            Some(caps) => statistics.push(json!({
                "statisticType": caps[1].to_lowercase(),
                "onStatisticField": &caps[2],
                "outStatisticFieldName": &caps[3],
            })),
            None => plain_fields.push(field.trim().to_string()),
        }
    }

    let base = format!("{}/{}/query", service_url.trim_end_matches('/'), layer_id);
    let mut params: Vec<(&str, String)> = vec![
        ("where", service.where_clause.clone().unwrap_or_else(|| "1=1".to_string())),
        ("returnGeometry", "false".to_string()),
        ("f", "json".to_string()),
    ];

    let has_statistics = !statistics.is_empty();
    if has_statistics {
        params.push(("outStatistics", Value::Array(statistics).to_string()));
        if let Some(ref group_by) = service.group_by {
            params.push(("groupByFieldsForStatistics", group_by.clone()));
        }
    }
    if !plain_fields.is_empty() || !has_statistics {
        let fields = if plain_fields.is_empty() {
            "*".to_string()
        } else {
            plain_fields.join(",")
        };
        params.push(("outFields", fields));
    }

    Ok(Url::parse_with_params(&base, &params)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StaticFetcher;

    fn totals_service() -> GeoService {
        GeoService {
            flc_id: "abc123".to_string(),
            layer_name: "CaseCounts".to_string(),
            out_fields: vec![
                "sum(TOTAL_CASES) as TOTAL_CASES".to_string(),
                "sum(TOTAL_DEATHS) as TOTAL_DEATHS".to_string(),
            ],
            ..GeoService::default()
        }
    }

    #[test]
    fn test_statistics_query_url() {
        let url = build_query_url(
            "https://services7.arcgis.com/org/arcgis/rest/services/Cases/FeatureServer",
            2,
            &totals_service(),
        )
        .unwrap();

        assert!(url.as_str().starts_with(
            "https://services7.arcgis.com/org/arcgis/rest/services/Cases/FeatureServer/2/query?"
        ));
        let params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let stats = &params.iter().find(|(k, _)| k == "outStatistics").unwrap().1;
        let parsed: Value = serde_json::from_str(stats).unwrap();
        assert_eq!(parsed[0]["statisticType"], "sum");
        assert_eq!(parsed[1]["outStatisticFieldName"], "TOTAL_DEATHS");
        assert!(params.iter().all(|(k, _)| k != "outFields"));
        assert!(params.contains(&("where".to_string(), "1=1".to_string())));
    }

    #[test]
    fn test_plain_fields_query_url() {
        let service = GeoService {
            out_fields: vec!["County".to_string(), "Cases".to_string()],
            where_clause: Some("County <> 'Unknown'".to_string()),
            ..totals_service()
        };
        let url = build_query_url("https://host/FeatureServer/", 0, &service).unwrap();
        let params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(params.contains(&("outFields".to_string(), "County,Cases".to_string())));
        assert!(params.contains(&("where".to_string(), "County <> 'Unknown'".to_string())));
        assert!(url.as_str().starts_with("https://host/FeatureServer/0/query?"));
    }

    #[test]
    fn test_query_geoservice_end_to_end() {
        let service = totals_service();
        let service_url = "https://services7.arcgis.com/org/arcgis/rest/services/Cases/FeatureServer";
        let query_url = build_query_url(service_url, 3, &service).unwrap();

        let fetcher = StaticFetcher::new()
            .with_body(
                item_url("abc123").unwrap().as_str(),
                // 2020-06-28T12:00:00Z
                format!(r#"{{"url": "{}", "modified": 1593345600000}}"#, service_url),
            )
            .with_body(
                format!("{}?f=json", service_url),
                r#"{"layers": [{"id": 1, "name": "Other"}, {"id": 3, "name": "CaseCounts"}]}"#,
            )
            .with_body(
                query_url.as_str(),
                r#"{"features": [{"attributes": {"TOTAL_CASES": 171182, "TOTAL_DEATHS": 13181}}]}"#,
            );

        let (date, rows) = query_geoservice(&fetcher, &service).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2020, 6, 28).unwrap());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["TOTAL_CASES"], 171182);
    }

    #[test]
    fn test_missing_layer() {
        let service_url = "https://host/FeatureServer";
        let fetcher = StaticFetcher::new()
            .with_body(
                item_url("abc123").unwrap().as_str(),
                format!(r#"{{"url": "{}", "modified": 0}}"#, service_url),
            )
            .with_body(format!("{}?f=json", service_url), r#"{"layers": []}"#);

        let err = query_geoservice(&fetcher, &totals_service()).unwrap_err();
        assert_eq!(err.class_name(), "MissingRow");
    }
}
