use serde_json::Value;

/// Campaign browsing filter: free-text search over title and description,
/// and an optional category. An empty filter matches every campaign.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CampaignFilter {
    pub search: Option<String>,
    pub category: Option<String>,
}

fn field_lower(campaign: &Value, key: &str) -> String {
    campaign
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_lowercase()
}

impl CampaignFilter {
    pub fn is_empty(&self) -> bool {
        self.term().is_none() && self.category().is_none()
    }

    fn term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    /// `"all"` is the same as no category.
    fn category(&self) -> Option<&str> {
        self.category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("all"))
    }

    pub fn matches(&self, campaign: &Value) -> bool {
        let matches_search = match self.term() {
            Some(term) => {
                field_lower(campaign, "title").contains(&term)
                    || field_lower(campaign, "description").contains(&term)
            }
            None => true,
        };
        let matches_category = match self.category() {
            Some(category) => campaign
                .get("category")
                .and_then(Value::as_str)
                .is_some_and(|c| c.trim().eq_ignore_ascii_case(category)),
            None => true,
        };
        matches_search && matches_category
    }

    pub fn apply(&self, campaigns: Vec<Value>) -> Vec<Value> {
        if self.is_empty() {
            return campaigns;
        }
        campaigns.into_iter().filter(|c| self.matches(c)).collect()
    }
}
