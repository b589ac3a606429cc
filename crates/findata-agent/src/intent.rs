//! Intent resolution: free text → structured request
//!
//! Resolution never fails: every field is nullable or defaultable, and
//! anything unresolved is deferred to the generated code, which is
//! instructed to query the data API with whatever parameters exist.

use crate::symbols::SymbolLookup;
use chrono::{Duration as ChronoDuration, NaiveDate};
use findata_llm::{CompletionRequest, LLMProvider, Message};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})年(\d{1,2})月(\d{1,2})日").expect("valid date pattern")
});

static CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{6})\s*[.。·]?\s*(?i)(SH|SZ|BJ)").expect("valid code pattern")
});

static PERIOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:近|最近)\s*(\d*)\s*(年|个月|月|周|天)").expect("valid period pattern")
});

/// Requested output actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actions {
    /// Export a tabular artifact (Excel/CSV)
    pub export: bool,
    /// Render a chart artifact
    pub plot: bool,
}

impl Default for Actions {
    /// Policy default: never leave a request with no action
    fn default() -> Self {
        Self {
            export: true,
            plot: false,
        }
    }
}

/// Structured interpretation of one free-text user request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    /// Raw user text
    pub raw: String,

    /// Canonical entity code (6 digits + exchange suffix)
    pub entity_code: Option<String>,

    /// Display name of the entity, when known
    pub entity_name: Option<String>,

    /// Start date, `YYYYMMDD`
    pub start_date: Option<String>,

    /// End date, `YYYYMMDD`
    pub end_date: Option<String>,

    /// Requested output actions
    pub actions: Actions,

    /// API-name override from model-assisted extraction
    pub api: Option<String>,

    /// Parameter-map override from model-assisted extraction
    pub params: Option<serde_json::Value>,
}

/// Hints from model-assisted structured extraction
///
/// Every field is optional; boolean action hints take precedence over the
/// keyword heuristics, everything else fills gaps the heuristics left.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionHints {
    /// Entity display name
    pub name: Option<String>,
    /// Entity code
    #[serde(alias = "code")]
    pub ts_code: Option<String>,
    /// Start date
    pub start_date: Option<String>,
    /// End date
    pub end_date: Option<String>,
    /// Export action hint
    pub export: Option<bool>,
    /// Plot action hint
    pub plot: Option<bool>,
    /// API-name override
    pub api: Option<String>,
    /// Parameter-map override
    pub params: Option<serde_json::Value>,
}

const EXPORT_KEYWORDS: &[&str] = &[
    "导出", "保存", "存为", "excel", "xlsx", "csv", "表格", "数据",
];
const PLOT_KEYWORDS: &[&str] = &[
    "画图", "画出", "绘图", "绘制", "图表", "走势", "k线", "曲线", "可视化",
];
const ONLY_EXPORT_KEYWORDS: &[&str] = &["只导出", "仅导出", "只要导出"];
const ONLY_PLOT_KEYWORDS: &[&str] = &["只画图", "仅画图", "只绘图", "只要画图"];
const NO_EXPORT_KEYWORDS: &[&str] = &["不要导出", "不导出", "别导出", "无需导出"];
const NO_PLOT_KEYWORDS: &[&str] = &["不要画图", "不画图", "别画图", "不要绘图", "无需画图"];

/// Resolve a free-text request into a structured [`Intent`]
///
/// `hints` come from the optional model-assisted extraction pass; pass
/// `None` to rely on the pattern-matching floor alone.
pub fn resolve(
    text: &str,
    symbols: &dyn SymbolLookup,
    hints: Option<&ExtractionHints>,
) -> Intent {
    let (mut start_date, mut end_date) = extract_dates(text);
    if start_date.is_none() && end_date.is_none() {
        if let Some((start, end)) = period_to_range(text, chrono::Local::now().date_naive()) {
            start_date = Some(start);
            end_date = Some(end);
        }
    }
    let (mut entity_code, mut entity_name) = extract_entity(text, symbols);
    let actions = detect_actions(text, hints);

    if let Some(hints) = hints {
        if start_date.is_none() {
            start_date = hints.start_date.as_deref().and_then(normalize_date);
        }
        if end_date.is_none() {
            end_date = hints.end_date.as_deref().and_then(normalize_date);
        }
        if entity_code.is_none() {
            entity_code = hints
                .ts_code
                .as_deref()
                .and_then(normalize_code)
                .or_else(|| hints.name.as_deref().and_then(|n| symbols.lookup(n)));
        }
        if entity_name.is_none() {
            entity_name = hints.name.clone();
        }
    }

    Intent {
        raw: text.to_string(),
        entity_code,
        entity_name,
        start_date,
        end_date,
        actions,
        api: hints.and_then(|h| h.api.clone()),
        params: hints.and_then(|h| h.params.clone()),
    }
}

/// First two localized long-form dates in encounter order, as `YYYYMMDD`
fn extract_dates(text: &str) -> (Option<String>, Option<String>) {
    let mut dates = DATE_RE.captures_iter(text).filter_map(|caps| {
        let year: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        Some(format!("{year:04}{month:02}{day:02}"))
    });

    let start = dates.next();
    let end = dates.next();
    (start, end)
}

/// Direct market-identifier pattern, else a known name occurring in the text
fn extract_entity(text: &str, symbols: &dyn SymbolLookup) -> (Option<String>, Option<String>) {
    if let Some(caps) = CODE_RE.captures(text) {
        let code = format!("{}.{}", &caps[1], caps[2].to_uppercase());
        return (Some(code), None);
    }

    match symbols.scan(text) {
        Some((name, code)) => (Some(code), Some(name)),
        None => (None, None),
    }
}

/// Keyword heuristics with exclusive overrides, negations, hint precedence
/// and the default-export floor
fn detect_actions(text: &str, hints: Option<&ExtractionHints>) -> Actions {
    let lowered = text.to_lowercase();
    let contains_any = |keywords: &[&str]| keywords.iter().any(|kw| lowered.contains(kw));

    let mut export = contains_any(EXPORT_KEYWORDS);
    let mut plot = contains_any(PLOT_KEYWORDS);

    // "only X" keywords are exclusive overrides
    if contains_any(ONLY_PLOT_KEYWORDS) {
        export = false;
        plot = true;
    }
    if contains_any(ONLY_EXPORT_KEYWORDS) {
        export = true;
        plot = false;
    }

    // Explicit negations win over plain keywords
    if contains_any(NO_PLOT_KEYWORDS) {
        plot = false;
    }
    if contains_any(NO_EXPORT_KEYWORDS) {
        export = false;
    }

    // Boolean hints from model-assisted extraction take precedence
    if let Some(hints) = hints {
        if let Some(hint) = hints.export {
            export = hint;
        }
        if let Some(hint) = hints.plot {
            plot = hint;
        }
    }

    // Never leave a request with no action
    if !export && !plot {
        export = true;
    }

    Actions { export, plot }
}

/// Normalize a date hint (`YYYYMMDD` or `YYYY-MM-DD`) to `YYYYMMDD`
fn normalize_date(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    (digits.len() == 8).then_some(digits)
}

/// Normalize an entity-code hint to the canonical `digits.SUFFIX` form
fn normalize_code(raw: &str) -> Option<String> {
    let caps = CODE_RE.captures(raw)?;
    Some(format!("{}.{}", &caps[1], caps[2].to_uppercase()))
}

/// Convert a relative period ("近3年", "最近30天") into a date range
///
/// Used by [`resolve`] when no positional dates are present; digit-free
/// period words default to one unit, a bare "近天" request to 30 days.
pub fn period_to_range(text: &str, today: NaiveDate) -> Option<(String, String)> {
    let caps = PERIOD_RE.captures(text)?;
    let count: i64 = caps[1].parse().unwrap_or(1);
    let days = match &caps[2] {
        "年" => count * 365,
        "月" | "个月" => count * 30,
        "周" => count * 7,
        "天" => {
            if caps[1].is_empty() {
                30
            } else {
                count
            }
        }
        _ => return None,
    };

    let start = today - ChronoDuration::days(days);
    Some((
        start.format("%Y%m%d").to_string(),
        today.format("%Y%m%d").to_string(),
    ))
}

/// Ask the generator for structured hints about a request
///
/// Failures degrade silently to `None`: extraction is an accuracy boost,
/// never a gate.
pub async fn extract_hints(
    provider: &dyn LLMProvider,
    model: &str,
    max_tokens: usize,
    text: &str,
) -> Option<ExtractionHints> {
    let prompt = format!(
        "从下面的用户请求中提取参数，只输出一个JSON对象，不要解释。\
         字段: name(公司名), ts_code(股票代码), start_date(YYYYMMDD), \
         end_date(YYYYMMDD), export(bool), plot(bool), api(接口名), params(对象)。\
         无法确定的字段省略。\n请求：{text}"
    );

    let request = CompletionRequest::builder(model)
        .add_message(Message::user(prompt))
        .max_tokens(max_tokens)
        .temperature(0.0)
        .build();

    let response = match provider.complete(request).await {
        Ok(response) => response,
        Err(e) => {
            debug!("Intent extraction call failed, falling back to heuristics: {e}");
            return None;
        }
    };

    parse_hints(response.message.text())
}

/// Lenient JSON extraction: first `{` to last `}`, then strict parse
fn parse_hints(text: &str) -> Option<ExtractionHints> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }

    match serde_json::from_str::<ExtractionHints>(&text[start..=end]) {
        Ok(hints) => Some(hints),
        Err(e) => {
            debug!("Unparseable extraction response: {e}");
            None
        }
    }
}
