use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

const DEFAULT_PAYMENT_METHOD: &str = "card";
const DEFAULT_STATUS: &str = "Completed";

/// One donation as the history views show it, whatever field names the
/// backend serializer used.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DonationRecord {
    pub id: String,
    pub campaign_id: Option<u64>,
    pub campaign_title: String,
    pub organization: String,
    pub amount: f64,
    /// Backend timestamp as sent.
    pub date: Option<String>,
    pub payment_method: String,
    pub is_anonymous: bool,
    pub status: String,
    #[serde(skip)]
    pub timestamp: Option<OffsetDateTime>,
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// First non-empty string among `paths`; a path is one key or `outer.inner`.
fn first_text(d: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|path| match path.split_once('.') {
        Some((outer, inner)) => non_empty_str(d.get(outer).and_then(|o| o.get(inner))),
        None => non_empty_str(d.get(*path)),
    })
}

fn first_bool(d: &Value, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|k| d.get(*k).and_then(Value::as_bool))
}

fn number(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn campaign_id(d: &Value) -> Option<u64> {
    d.get("campaign")
        .and_then(Value::as_u64)
        .or_else(|| d.get("campaignId").and_then(Value::as_u64))
        .or_else(|| d.get("campaign").and_then(|c| c.get("id")).and_then(Value::as_u64))
}

/// RFC 3339, then a naive `YYYY-MM-DDTHH:MM:SS`, then a bare date; the
/// latter two are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(ts);
    }
    if let Ok(ts) = PrimitiveDateTime::parse(raw, format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]")) {
        return Some(ts.assume_utc());
    }
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(|d| d.midnight().assume_utc())
}

impl DonationRecord {
    pub fn from_value(d: &Value) -> Self {
        let campaign_id = campaign_id(d);
        let date = first_text(d, &["date", "created_at", "createdAt"]);

        let id = match d.get("id") {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => format!(
                "{}-{}",
                campaign_id.map_or_else(|| "x".to_string(), |c| c.to_string()),
                date.as_deref().unwrap_or("unknown")
            ),
        };

        let campaign_title = first_text(d, &["campaignTitle", "campaign_title", "campaign.title"])
            .unwrap_or_else(|| match campaign_id {
                Some(id) => format!("Campaign #{id}"),
                None => "Campaign".to_string(),
            });

        Self {
            id,
            campaign_id,
            campaign_title,
            organization: first_text(
                d,
                &["organization", "campaign.organization", "campaign.owner", "owner"],
            )
            .unwrap_or_default(),
            amount: number(d.get("amount")).unwrap_or(0.0),
            timestamp: date.as_deref().and_then(parse_timestamp),
            date,
            payment_method: first_text(d, &["paymentMethod", "payment_method"])
                .unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string()),
            is_anonymous: first_bool(d, &["isAnonymous", "is_anonymous"]).unwrap_or(false),
            status: first_text(d, &["status", "status_display"])
                .unwrap_or_else(|| DEFAULT_STATUS.to_string()),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status.eq_ignore_ascii_case(DEFAULT_STATUS)
    }

    fn in_month_of(&self, now: OffsetDateTime) -> bool {
        self.timestamp
            .is_some_and(|ts| ts.year() == now.year() && ts.month() == now.month())
    }

    /// `None` and `"all"` match everything; otherwise a case-insensitive status match.
    pub fn has_status(&self, status: Option<&str>) -> bool {
        match status.map(str::trim) {
            None | Some("") => true,
            Some(s) if s.eq_ignore_ascii_case("all") => true,
            Some(s) => self.status.eq_ignore_ascii_case(s),
        }
    }
}

/// Normalizes every record and orders them newest first. Undated records
/// sort last, keeping their backend order.
pub fn normalize(items: &[Value]) -> Vec<DonationRecord> {
    let mut records: Vec<DonationRecord> = items.iter().map(DonationRecord::from_value).collect();
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    records
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DonationSummary {
    pub count: usize,
    pub campaigns: usize,
    /// Every donation, any status.
    pub total: f64,
    pub this_month: f64,
    /// Money actually moved: `Completed` donations only.
    pub completed_total: f64,
    pub completed_this_month: f64,
}

impl DonationSummary {
    pub fn compute(records: &[DonationRecord], now: OffsetDateTime) -> Self {
        let mut summary = Self {
            count: records.len(),
            ..Self::default()
        };
        let mut campaigns = HashSet::new();

        for r in records {
            campaigns.insert(match r.campaign_id {
                Some(id) => id.to_string(),
                None => r.campaign_title.clone(),
            });

            summary.total += r.amount;
            let this_month = r.in_month_of(now);
            if this_month {
                summary.this_month += r.amount;
            }
            if r.is_completed() {
                summary.completed_total += r.amount;
                if this_month {
                    summary.completed_this_month += r.amount;
                }
            }
        }

        summary.campaigns = campaigns.len();
        summary
    }
}

/// Filtered listing plus totals over the full history.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DonationHistory {
    pub summary: DonationSummary,
    pub donations: Vec<DonationRecord>,
}

impl DonationHistory {
    pub fn build(items: &[Value], status: Option<&str>, now: OffsetDateTime) -> Self {
        let records = normalize(items);
        let summary = DonationSummary::compute(&records, now);
        let donations = records.into_iter().filter(|r| r.has_status(status)).collect();
        Self { summary, donations }
    }
}
