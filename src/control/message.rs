//! Operator-facing message text.
//!
//! Messages are sent with Telegram's legacy Markdown parse mode. Every value
//! that does not come from this module (metric name, container, diagnosis,
//! docker output) goes through [`escape`], since one stray `_` or `*` makes
//! the whole message unparsable.

use crate::config::SentinelConfig;
use crate::detect::{AnomalyVerdict, Baseline};
use crate::remedy::RemediationOutcome;

/// Escape the characters legacy Markdown treats as entity delimiters.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub fn online(config: &SentinelConfig, baseline: Option<&Baseline>) -> String {
    let mut msg = format!(
        "🛡️ *Sentinel v{} Online*\nWatching {}",
        env!("CARGO_PKG_VERSION"),
        escape(&config.source.metric_name)
    );
    let unit = escape(&config.source.unit);
    if let Some(b) = baseline {
        msg.push_str(&format!(
            "\nBaseline: {} points, mean {:.2}{unit}, std dev {:.2}",
            b.len(),
            b.mean(),
            b.std_dev()
        ));
    }
    msg.push_str(&format!(
        "\nThresholds: floor {:.1}{unit}, ceiling {:.1}{unit}",
        config.detector.floor,
        config.detector.ceiling,
    ));
    if config.remediation.enabled {
        msg.push_str(&format!("\nSelf-healing target: {}", escape(&config.remediation.target)));
    } else {
        msg.push_str("\nSelf-healing: disabled (diagnose only)");
    }
    msg
}

pub fn incident(
    config: &SentinelConfig,
    verdict: &AnomalyVerdict,
    baseline: Option<&Baseline>,
    diagnostic: &str,
    outcome: &RemediationOutcome,
) -> String {
    let unit = escape(&config.source.unit);
    let mut msg = format!(
        "🚨 *ANOMALY DETECTED*\n{}: {:.2}{}",
        escape(&config.source.metric_name),
        verdict.observation.value,
        unit
    );
    if let Some(trigger) = verdict.trigger {
        msg.push_str(&format!(" ({})", trigger));
    }
    if let Some(b) = baseline {
        msg.push_str(&format!("\nBaseline mean: {:.2}{}", b.mean(), unit));
    }
    msg.push_str(&format!("\n\n🧠 *Diagnosis:*\n{}", escape(diagnostic)));
    msg.push_str(&format!("\n\n🛠️ *Self-Healing Action:*\n{}", escape(&outcome.to_string())));
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Observation, Trigger};

    #[test]
    fn test_incident_message_carries_all_parts() {
        let config = SentinelConfig::default();
        let verdict = AnomalyVerdict {
            observation: Observation::new(65.0),
            is_anomalous: true,
            score: None,
            statistical: false,
            trigger: Some(Trigger::Ceiling),
        };
        let baseline = Baseline::from_observations(&[Observation::new(1.0); 5], 5);
        let msg = incident(
            &config,
            &verdict,
            Some(&baseline),
            "diagnostic unavailable",
            &RemediationOutcome::Succeeded("restarted 'node_exporter'".into()),
        );

        assert!(msg.contains("CPU load: 65.00% (ceiling exceeded)"));
        assert!(msg.contains("Baseline mean: 1.00%"));
        assert!(msg.contains("diagnostic unavailable"));
        assert!(msg.contains("SUCCESS: restarted 'node\\_exporter'"));
    }

    /// Delimiters not preceded by a backslash.
    fn unescaped(msg: &str, delim: char) -> usize {
        let chars: Vec<char> = msg.chars().collect();
        (0..chars.len())
            .filter(|&i| chars[i] == delim && (i == 0 || chars[i - 1] != '\\'))
            .count()
    }

    #[test]
    fn test_dynamic_text_is_markdown_escaped() {
        let mut config = SentinelConfig::default();
        config.source.metric_name = "node_cpu_load".to_string();
        let verdict = AnomalyVerdict {
            observation: Observation::new(72.4),
            is_anomalous: true,
            score: Some(0.81),
            statistical: true,
            trigger: Some(Trigger::Statistical),
        };
        let msg = incident(
            &config,
            &verdict,
            None,
            "*Runaway* `cron_job`; see [docs",
            &RemediationOutcome::Failed("No such container: node_exporter".into()),
        );

        assert!(msg.contains("node\\_cpu\\_load: 72.40%"));
        assert!(msg.contains("\\*Runaway\\* \\`cron\\_job\\`; see \\[docs"));
        assert!(msg.contains("FAILED: No such container: node\\_exporter"));
        assert_eq!(unescaped(&msg, '_'), 0);
        assert_eq!(unescaped(&msg, '`'), 0);
        assert_eq!(unescaped(&msg, '['), 0);
        // Only the fixed bold headings remain, each opened and closed.
        assert_eq!(unescaped(&msg, '*'), 6);

        let online_msg = online(&config, None);
        assert_eq!(unescaped(&online_msg, '_'), 0);
        assert_eq!(unescaped(&online_msg, '*'), 2);
    }

    #[test]
    fn test_online_message_reflects_mode() {
        let mut config = SentinelConfig::default();
        assert!(online(&config, None).contains("target: node\\_exporter"));
        config.remediation.enabled = false;
        assert!(online(&config, None).contains("diagnose only"));
    }
}
