use serde::Deserialize;

/// Open States v3 list endpoints used for ground-truth sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Bills,
    People,
    Committees,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Self::Bills => "bills",
            Self::People => "people",
            Self::Committees => "committees",
        }
    }

    /// `include=` expansions requested for each endpoint.
    pub fn includes(&self) -> &'static [&'static str] {
        match self {
            Self::Bills => &["sponsorships", "documents", "versions"],
            Self::People => &[],
            Self::Committees => &["memberships"],
        }
    }

    /// Only the bills endpoint accepts an `updated_since` filter; the others
    /// always return the full list.
    pub fn supports_updated_since(&self) -> bool {
        matches!(self, Self::Bills)
    }

    pub fn per_page(&self) -> u32 {
        match self {
            Self::Bills => 20,
            Self::People | Self::Committees => 50,
        }
    }
}

/// Query filters shared by all list endpoints.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub jurisdiction: String,
    pub session: Option<String>,
    /// ISO-8601 lower bound for delta syncs (bills only).
    pub updated_since: Option<String>,
}

impl ListQuery {
    pub fn new(jurisdiction: impl Into<String>) -> Self {
        Self {
            jurisdiction: jurisdiction.into(),
            ..Default::default()
        }
    }

    pub fn session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    pub fn updated_since(mut self, since: impl Into<String>) -> Self {
        self.updated_since = Some(since.into());
        self
    }

    pub(crate) fn params(&self, endpoint: Endpoint, page: u32) -> Vec<(String, String)> {
        let mut params = vec![
            ("jurisdiction".to_string(), self.jurisdiction.clone()),
            ("page".to_string(), page.to_string()),
            ("per_page".to_string(), endpoint.per_page().to_string()),
        ];
        if endpoint == Endpoint::Bills {
            if let Some(session) = &self.session {
                params.push(("session".to_string(), session.clone()));
            }
            params.push(("sort".to_string(), "updated_desc".to_string()));
        }
        if endpoint.supports_updated_since() {
            if let Some(since) = &self.updated_since {
                params.push(("updated_since".to_string(), since.clone()));
            }
        }
        for include in endpoint.includes() {
            params.push(("include".to_string(), include.to_string()));
        }
        params
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pagination {
    pub per_page: u32,
    pub page: u32,
    pub max_page: u32,
    #[serde(default)]
    pub total_items: u64,
}

/// One page of a list endpoint. Records are left source-native.
#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    pub results: Vec<serde_json::Value>,
    pub pagination: Pagination,
}

/// All records gathered by walking pages up to a cap.
#[derive(Debug, Clone, Default)]
pub struct Paginated {
    pub records: Vec<serde_json::Value>,
    pub pages_fetched: u32,
    /// More pages existed upstream than the cap allowed.
    pub truncated: bool,
    pub total_items: u64,
}
