//! Deterministic fallback script for the daily-bar export/plot path
//!
//! When generated code runs clean but no artifact can be located, this
//! template produces the deliverable without another model round trip. It
//! covers exactly one endpoint (`pro.daily`); anything else is refused so
//! the caller surfaces an honest failure instead of querying the wrong API.

use crate::config::AgentConfig;
use crate::error::{AgentError, Result};
use crate::intent::Intent;

/// Builds the template script for a fully resolved daily-bar intent
pub struct FallbackScript;

impl FallbackScript {
    /// Render the template for `intent`
    ///
    /// Requires an entity code and both dates; refuses intents that carry an
    /// API or parameter override, since the template only knows `pro.daily`.
    pub fn build(intent: &Intent, config: &AgentConfig) -> Result<String> {
        if let Some(api) = &intent.api {
            if api != "daily" && api != "pro.daily" {
                return Err(AgentError::UnsupportedCombination(format!(
                    "fallback only covers pro.daily, intent requested {api}"
                )));
            }
        }
        if intent.params.is_some() {
            return Err(AgentError::UnsupportedCombination(
                "fallback cannot honor a parameter-map override".to_string(),
            ));
        }

        let code = intent.entity_code.as_deref().ok_or_else(|| {
            AgentError::UnsupportedCombination("fallback requires a resolved entity code".to_string())
        })?;
        let (start, end) = match (&intent.start_date, &intent.end_date) {
            (Some(s), Some(e)) => (s.as_str(), e.as_str()),
            _ => {
                return Err(AgentError::UnsupportedCombination(
                    "fallback requires a resolved date range".to_string(),
                ));
            }
        };

        let exports = config.exports_dir.display();
        let stem = format!("{}_{start}_{end}", code.replace('.', "_"));

        let mut script = format!(
            r#"df = pro.daily(ts_code='{code}', start_date='{start}', end_date='{end}')
if df is None or df.empty:
    print('未获取到数据，请检查代码和日期区间。')
    sys.exit(1)
df = df.sort_values('trade_date').reset_index(drop=True)
df = df.rename(columns={{
    'ts_code': '股票代码',
    'trade_date': '交易日期',
    'open': '开盘价',
    'high': '最高价',
    'low': '最低价',
    'close': '收盘价',
    'vol': '成交量',
    'amount': '成交额',
}})
"#
        );

        if intent.actions.export {
            script.push_str(&format!(
                r#"excel_path = '{exports}/{stem}.xlsx'
df.to_excel(excel_path, index=False)
"#
            ));
        }

        if intent.actions.plot {
            script.push_str(&format!(
                r#"plt.figure(figsize=(12, 6))
plt.plot(pd.to_datetime(df['交易日期']), df['收盘价'])
plt.title('{code} 收盘价走势')
plt.xlabel('日期')
plt.ylabel('收盘价')
plt.grid(True)
plot_path = '{exports}/{stem}.png'
plt.savefig(plot_path)
plt.close()
"#
            ));
        }

        // Excel artifact is the primary deliverable when both are produced
        if intent.actions.export {
            script.push_str("print_output_path(excel_path)\n");
        } else if intent.actions.plot {
            script.push_str("print_output_path(plot_path)\n");
        }

        Ok(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::Actions;

    fn resolved_intent() -> Intent {
        Intent {
            raw: "导出贵州茅台2023年1月日线".to_string(),
            entity_code: Some("600519.SH".to_string()),
            entity_name: Some("贵州茅台".to_string()),
            start_date: Some("20230101".to_string()),
            end_date: Some("20230131".to_string()),
            actions: Actions {
                export: true,
                plot: false,
            },
            api: None,
            params: None,
        }
    }

    #[test]
    fn test_export_only_script() {
        let config = AgentConfig::default();
        let script = FallbackScript::build(&resolved_intent(), &config).unwrap();

        assert!(script.contains("pro.daily(ts_code='600519.SH'"));
        assert!(script.contains("600519_SH_20230101_20230131.xlsx"));
        assert!(script.contains("print_output_path(excel_path)"));
        assert!(!script.contains("plt.savefig"));
    }

    #[test]
    fn test_plot_only_script() {
        let config = AgentConfig::default();
        let mut intent = resolved_intent();
        intent.actions = Actions {
            export: false,
            plot: true,
        };
        let script = FallbackScript::build(&intent, &config).unwrap();

        assert!(script.contains("plt.savefig"));
        assert!(script.contains("print_output_path(plot_path)"));
        assert!(!script.contains("to_excel"));
    }

    #[test]
    fn test_export_and_plot_reports_excel() {
        let config = AgentConfig::default();
        let mut intent = resolved_intent();
        intent.actions = Actions {
            export: true,
            plot: true,
        };
        let script = FallbackScript::build(&intent, &config).unwrap();

        assert!(script.contains("to_excel"));
        assert!(script.contains("plt.savefig"));
        assert!(script.contains("print_output_path(excel_path)"));
        assert!(!script.contains("print_output_path(plot_path)"));
    }

    #[test]
    fn test_api_override_refused() {
        let config = AgentConfig::default();
        let mut intent = resolved_intent();
        intent.api = Some("income".to_string());

        let result = FallbackScript::build(&intent, &config);
        assert!(matches!(
            result,
            Err(AgentError::UnsupportedCombination(_))
        ));
    }

    #[test]
    fn test_daily_api_override_accepted() {
        let config = AgentConfig::default();
        let mut intent = resolved_intent();
        intent.api = Some("daily".to_string());

        assert!(FallbackScript::build(&intent, &config).is_ok());
    }

    #[test]
    fn test_params_override_refused() {
        let config = AgentConfig::default();
        let mut intent = resolved_intent();
        intent.params = Some(serde_json::json!({"adj": "qfq"}));

        assert!(matches!(
            FallbackScript::build(&intent, &config),
            Err(AgentError::UnsupportedCombination(_))
        ));
    }

    #[test]
    fn test_unresolved_intent_refused() {
        let config = AgentConfig::default();
        let mut intent = resolved_intent();
        intent.entity_code = None;
        assert!(FallbackScript::build(&intent, &config).is_err());

        let mut intent = resolved_intent();
        intent.end_date = None;
        assert!(FallbackScript::build(&intent, &config).is_err());
    }
}
