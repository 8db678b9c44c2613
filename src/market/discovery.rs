use chrono::TimeZone;
use chrono_tz::America::New_York;

use crate::config::Config;
use crate::types::EventContext;

/// Discovers new hourly BTC up/down events and keeps the active set fresh.
///
/// 1h markets use human-readable slugs keyed to the top-of-hour Eastern-time boundary
/// (e.g. `bitcoin-up-or-down-february-16-3am-et`), so slug-based lookup alone can miss —
/// series_id search is the reliable fallback, matching the teacher's discovery module.
pub struct EventScanner {
    http: reqwest::Client,
    config: Config,
}

impl EventScanner {
    pub fn new(config: Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Scans for events starting within the next two hours that aren't already tracked,
    /// bounded to `MAX_CONCURRENT_EVENTS` total active events.
    pub async fn scan_for_events(
        &self,
        already_tracked: &[String],
        now_ms: i64,
    ) -> Vec<EventContext> {
        if already_tracked.len() >= self.config.max_concurrent_events {
            return Vec::new();
        }

        let mut found = Vec::new();
        for slug in candidate_slugs(now_ms) {
            if already_tracked.contains(&slug) || found.iter().any(|e: &EventContext| e.slug == slug) {
                continue;
            }
            match self.fetch_event_by_slug(&slug).await {
                Ok(Some(ctx)) => {
                    eprintln!("[DISCOVERY] found {}", ctx.slug);
                    found.push(ctx);
                }
                Ok(None) => eprintln!("[DISCOVERY] slug {} not found", slug),
                Err(e) => eprintln!("[DISCOVERY] error fetching {}: {}", slug, e),
            }
            if already_tracked.len() + found.len() >= self.config.max_concurrent_events {
                break;
            }
        }

        if found.is_empty() && already_tracked.is_empty() {
            eprintln!("[DISCOVERY] slug lookup empty, falling back to series_id={} search", self.config.series_id);
            if let Ok(ctxs) = self.discover_via_series(now_ms).await {
                found.extend(ctxs.into_iter().filter(|c| !already_tracked.contains(&c.slug)));
            }
        }

        found
    }

    async fn fetch_event_by_slug(&self, slug: &str) -> Result<Option<EventContext>, String> {
        let url = format!("{}/events?slug={}", self.config.gamma_api_url, slug);
        let resp = self.http.get(&url).send().await.map_err(|e| format!("HTTP error: {e}"))?;
        let text = resp.text().await.map_err(|e| format!("body error: {e}"))?;
        let events: serde_json::Value = serde_json::from_str(&text).map_err(|e| format!("JSON error: {e}"))?;
        let events_arr = events.as_array().cloned().unwrap_or_default();
        if events_arr.is_empty() {
            return Ok(None);
        }
        Ok(parse_event(&events_arr[0], slug))
    }

    async fn discover_via_series(&self, now_ms: i64) -> Result<Vec<EventContext>, String> {
        let url = format!(
            "{}/events?series_id={}&active=true&closed=false&limit=100&order=endDate&ascending=false",
            self.config.gamma_api_url, self.config.series_id,
        );
        eprintln!("[DISCOVERY] fetching {}", url);
        let resp = self.http.get(&url).send().await.map_err(|e| format!("HTTP error: {e}"))?;
        let text = resp.text().await.map_err(|e| format!("body error: {e}"))?;
        let events: serde_json::Value = serde_json::from_str(&text).map_err(|e| format!("JSON error: {e}"))?;
        let events_arr = events.as_array().ok_or("expected array of events")?;

        let mut out = Vec::new();
        for event in events_arr {
            let slug = event.get("slug").and_then(|s| s.as_str()).unwrap_or("");
            if let Some(ctx) = parse_event(event, slug) {
                if ctx.end_ms >= now_ms {
                    out.push(ctx);
                }
            }
        }
        out.sort_by_key(|c| c.start_ms);
        Ok(out)
    }
}

/// Generates the human-readable ET slug for the current and next top-of-hour windows.
/// Format: `bitcoin-up-or-down-{month}-{day}-{h12}{am|pm}-et`.
fn candidate_slugs(now_ms: i64) -> Vec<String> {
    let now = chrono::Utc.timestamp_millis_opt(now_ms).single().unwrap_or_else(chrono::Utc::now);
    let et_now = now.with_timezone(&New_York);
    let current_hour_start = et_now
        .date_naive()
        .and_hms_opt(et_now.format("%H").to_string().parse().unwrap_or(0), 0, 0)
        .unwrap();
    let current_hour_start = New_York.from_local_datetime(&current_hour_start).single().unwrap_or(et_now);
    let next_hour_start = current_hour_start + chrono::Duration::hours(1);

    vec![generate_slug(current_hour_start), generate_slug(next_hour_start)]
}

fn generate_slug(et_time: chrono::DateTime<chrono_tz::Tz>) -> String {
    let month = et_time.format("%B").to_string().to_lowercase();
    let day = et_time.format("%-d").to_string();
    let hour24: u32 = et_time.format("%H").to_string().parse().unwrap_or(0);
    let hour12 = match hour24 % 12 {
        0 => 12,
        h => h,
    };
    let ampm = if hour24 < 12 { "am" } else { "pm" };
    format!("bitcoin-up-or-down-{month}-{day}-{hour12}{ampm}-et")
}

fn parse_event(event: &serde_json::Value, slug: &str) -> Option<EventContext> {
    let markets = event.get("markets").and_then(|m| m.as_array())?;
    if markets.is_empty() {
        return None;
    }

    let condition_id = markets[0]
        .get("conditionId")
        .and_then(|c| c.as_str())
        .unwrap_or("")
        .to_string();

    let end_date = event.get("endDate").and_then(|s| s.as_str()).unwrap_or("");
    let end_ms = parse_datetime_ms(end_date)?;
    let start_ms = event
        .get("startDate")
        .and_then(|s| s.as_str())
        .and_then(parse_datetime_ms)
        .unwrap_or(end_ms - 3_600_000);

    let (yes_token, no_token) = extract_token_ids(markets);
    if yes_token.is_empty() || no_token.is_empty() {
        eprintln!("[DISCOVERY] skipping {}, can't find YES/NO tokens", slug);
        return None;
    }

    Some(EventContext {
        slug: slug.to_string(),
        condition_id,
        yes_token_id: yes_token,
        no_token_id: no_token,
        start_ms,
        end_ms,
        phase: crate::types::MarketPhase::PreMarket,
        yes_bid: None,
        no_bid: None,
    })
}

/// Handles both Gamma API market-list shapes: two separate markets tagged by outcome, or
/// one market carrying `outcomes`/`clobTokenIds` as JSON-array-encoded strings.
fn extract_token_ids(markets: &[serde_json::Value]) -> (String, String) {
    let mut yes_token = String::new();
    let mut no_token = String::new();

    if markets.len() == 2 {
        for market in markets {
            let outcome = market
                .get("groupItemTitle")
                .or_else(|| market.get("outcome"))
                .and_then(|o| o.as_str())
                .unwrap_or("")
                .to_lowercase();
            let token_id = extract_first_token_id(market);
            if outcome.contains("up") || outcome.contains("yes") || outcome.contains("higher") {
                yes_token = token_id;
            } else if outcome.contains("down") || outcome.contains("no") || outcome.contains("lower") {
                no_token = token_id;
            }
        }
    }

    if yes_token.is_empty() || no_token.is_empty() {
        for market in markets {
            let outcomes_str = market.get("outcomes").and_then(|o| o.as_str()).unwrap_or("");
            let tokens_str = market.get("clobTokenIds").and_then(|t| t.as_str()).unwrap_or("");
            if let (Ok(outcomes), Ok(tokens)) = (
                serde_json::from_str::<Vec<String>>(outcomes_str),
                serde_json::from_str::<Vec<String>>(tokens_str),
            ) {
                for (outcome, token) in outcomes.iter().zip(tokens.iter()) {
                    let lower = outcome.to_lowercase();
                    if lower.contains("up") || lower.contains("yes") || lower.contains("higher") {
                        yes_token = token.clone();
                    } else if lower.contains("down") || lower.contains("no") || lower.contains("lower") {
                        no_token = token.clone();
                    }
                }
            }
        }
    }

    (yes_token, no_token)
}

fn extract_first_token_id(market: &serde_json::Value) -> String {
    match market.get("clobTokenIds") {
        Some(raw) => {
            if let Some(s) = raw.as_str() {
                if s.starts_with('[') {
                    if let Ok(tokens) = serde_json::from_str::<Vec<String>>(s) {
                        return tokens.into_iter().next().unwrap_or_default();
                    }
                }
                s.to_string()
            } else if let Some(arr) = raw.as_array() {
                arr.first().and_then(|v| v.as_str()).unwrap_or("").to_string()
            } else {
                String::new()
            }
        }
        None => String::new(),
    }
}

fn parse_datetime_ms(s: &str) -> Option<i64> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%SZ") {
        return Some(dt.and_utc().timestamp_millis());
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.fZ") {
        return Some(dt.and_utc().timestamp_millis());
    }
    if let Ok(ts) = s.parse::<i64>() {
        return Some(if ts > 1_000_000_000_000 { ts } else { ts * 1000 });
    }
    None
}
