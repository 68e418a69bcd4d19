use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

// -- Sorting --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Likes,
    Views,
    Title,
}

impl SortField {
    pub const ALL: [SortField; 5] = [
        Self::CreatedAt,
        Self::UpdatedAt,
        Self::Likes,
        Self::Views,
        Self::Title,
    ];

    /// Column name in the store.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::Likes => "likes",
            Self::Views => "views",
            Self::Title => "title",
        }
    }
}

impl FromStr for SortField {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|f| f.as_str() == s).ok_or(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl FromStr for SortOrder {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: SortField,
    pub order: SortOrder,
}

impl SortSpec {
    pub const fn new(field: SortField, order: SortOrder) -> Self {
        Self { field, order }
    }
}

/// URL form: `<field>-<direction>`, e.g. `created_at-desc`.
impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.field.as_str(), self.order.as_str())
    }
}

impl FromStr for SortSpec {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Field names use underscores, so the last dash separates the direction.
        let (field, order) = s.rsplit_once('-').ok_or(())?;
        Ok(Self {
            field: field.parse()?,
            order: order.parse()?,
        })
    }
}

// -- Paging --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PageSize(u32);

impl PageSize {
    pub const ALLOWED: [u32; 3] = [20, 40, 60];

    pub fn new(size: u32) -> Option<Self> {
        Self::ALLOWED.contains(&size).then_some(Self(size))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self(20)
    }
}

impl TryFrom<u32> for PageSize {
    type Error = String;

    fn try_from(size: u32) -> Result<Self, Self::Error> {
        Self::new(size).ok_or_else(|| format!("unsupported page size {size}"))
    }
}

impl From<PageSize> for u32 {
    fn from(size: PageSize) -> Self {
        size.0
    }
}

/// Number of pages needed for `total_count` rows.
pub fn total_pages(total_count: u64, page_size: PageSize) -> u64 {
    total_count.div_ceil(u64::from(page_size.get()))
}

// -- Filtering --

/// Row predicate shared by the count query and the page query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveryFilter {
    /// Case-insensitive substring of the title.
    pub search: Option<String>,
    /// Exact `vehicle_name` match.
    pub vehicle_name: Option<String>,
}

impl LiveryFilter {
    pub fn matches(&self, title: &str, vehicle_name: &str) -> bool {
        let search_ok = self
            .search
            .as_deref()
            .is_none_or(|q| title.to_lowercase().contains(&q.to_lowercase()));
        let vehicle_ok = self.vehicle_name.as_deref().is_none_or(|v| v == vehicle_name);
        search_ok && vehicle_ok
    }
}

// -- Listing parameters --

/// The six parameters behind a listing view, mirrored into its URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingParams {
    pub page: u32,
    pub page_size: PageSize,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
    pub search_query: Option<String>,
    pub aircraft_filter: Option<String>,
}

impl Default for ListingParams {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: PageSize::default(),
            sort_by: SortField::default(),
            sort_order: SortOrder::default(),
            search_query: None,
            aircraft_filter: None,
        }
    }
}

impl ListingParams {
    pub fn sort(&self) -> SortSpec {
        SortSpec::new(self.sort_by, self.sort_order)
    }

    pub fn filter(&self) -> LiveryFilter {
        LiveryFilter {
            search: self.search_query.clone(),
            vehicle_name: self.aircraft_filter.clone(),
        }
    }

    /// Encode as `page=..&pageSize=..&sort=..[&search=..][&aircraft=..]`.
    pub fn to_query_string(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query
            .append_pair("page", &self.page.to_string())
            .append_pair("pageSize", &self.page_size.get().to_string())
            .append_pair("sort", &self.sort().to_string());
        if let Some(search) = &self.search_query {
            query.append_pair("search", search);
        }
        if let Some(aircraft) = &self.aircraft_filter {
            query.append_pair("aircraft", aircraft);
        }
        query.finish()
    }

    /// Decode a listing URL query. Missing or malformed values take defaults.
    pub fn from_query_string(query: &str) -> Self {
        let mut params = Self::default();
        let query = query.strip_prefix('?').unwrap_or(query);

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "page" => {
                    params.page = value.parse().ok().filter(|p| *p >= 1).unwrap_or(1);
                }
                "pageSize" => {
                    params.page_size = value
                        .parse()
                        .ok()
                        .and_then(PageSize::new)
                        .unwrap_or_default();
                }
                "sort" => {
                    let sort: SortSpec = value.parse().unwrap_or_default();
                    params.sort_by = sort.field;
                    params.sort_order = sort.order;
                }
                "search" => params.search_query = non_empty(&value),
                "aircraft" => params.aircraft_filter = non_empty(&value),
                _ => {}
            }
        }

        params
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_string_round_trip() {
        let params = ListingParams {
            page: 3,
            page_size: PageSize::new(40).unwrap(),
            sort_by: SortField::Likes,
            sort_order: SortOrder::Desc,
            search_query: Some("A320".into()),
            aircraft_filter: Some("Airbus A320".into()),
        };

        let encoded = params.to_query_string();
        assert_eq!(
            encoded,
            "page=3&pageSize=40&sort=likes-desc&search=A320&aircraft=Airbus+A320"
        );
        assert_eq!(ListingParams::from_query_string(&encoded), params);
    }

    #[test]
    fn round_trip_preserves_reserved_characters() {
        let params = ListingParams {
            search_query: Some("KLM & Air France = 100%".into()),
            aircraft_filter: Some("Boeing 747-400".into()),
            ..Default::default()
        };

        let decoded = ListingParams::from_query_string(&params.to_query_string());
        assert_eq!(decoded, params);
    }

    #[test]
    fn missing_parameters_take_defaults() {
        assert_eq!(ListingParams::from_query_string(""), ListingParams::default());
        assert_eq!(ListingParams::from_query_string("?"), ListingParams::default());

        let defaults = ListingParams::default();
        assert_eq!(defaults.to_query_string(), "page=1&pageSize=20&sort=created_at-desc");
    }

    #[test]
    fn malformed_values_fall_back() {
        let params = ListingParams::from_query_string(
            "page=0&pageSize=25&sort=popularity-up&search=&aircraft=",
        );
        assert_eq!(params, ListingParams::default());

        let params = ListingParams::from_query_string("page=abc&sort=title-asc");
        assert_eq!(params.page, 1);
        assert_eq!(params.sort(), SortSpec::new(SortField::Title, SortOrder::Asc));
    }

    #[test]
    fn sort_spec_splits_on_last_dash() {
        let sort: SortSpec = "updated_at-asc".parse().unwrap();
        assert_eq!(sort, SortSpec::new(SortField::UpdatedAt, SortOrder::Asc));
        assert!("created_at".parse::<SortSpec>().is_err());
        assert!("created-at-desc".parse::<SortSpec>().is_err());
    }

    #[test]
    fn total_pages_rounds_up() {
        let twenty = PageSize::default();
        assert_eq!(total_pages(45, twenty), 3);
        assert_eq!(total_pages(40, twenty), 2);
        assert_eq!(total_pages(0, twenty), 0);
    }

    #[test]
    fn filter_matches_case_insensitively() {
        let filter = LiveryFilter {
            search: Some("eva".into()),
            vehicle_name: Some("A330-300".into()),
        };
        assert!(filter.matches("EVA Air Laminar", "A330-300"));
        assert!(!filter.matches("EVA Air Laminar", "A330-200"));
        assert!(!filter.matches("Mexicana", "A330-300"));
        assert!(LiveryFilter::default().matches("anything", ""));
    }
}
