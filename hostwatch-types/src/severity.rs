//! Threshold severity scale.

use core::fmt;

/// Severity tier reached by a monitored field.
///
/// Ordered so that `max()` yields the worst status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum Severity {
    #[default]
    Ok,
    Careful,
    Warning,
    Critical,
}

impl Severity {
    /// All tiers above OK, lowest first.
    pub const TIERS: [Severity; 3] = [Severity::Careful, Severity::Warning, Severity::Critical];

    /// Upper-case label, as shown in the alert log.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Ok => "OK",
            Severity::Careful => "CAREFUL",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }

    /// Lower-case suffix used in limit configuration keys (`cpu_total_warning`).
    pub fn limit_suffix(&self) -> &'static str {
        match self {
            Severity::Ok => "ok",
            Severity::Careful => "careful",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }

    pub fn is_alert(&self) -> bool {
        *self > Severity::Ok
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_is_the_worst() {
        let worst = [Severity::Warning, Severity::Ok, Severity::Critical, Severity::Careful]
            .into_iter()
            .max();
        assert_eq!(worst, Some(Severity::Critical));
    }

    #[test]
    fn ok_is_not_an_alert() {
        assert!(!Severity::Ok.is_alert());
        assert!(Severity::TIERS.iter().all(Severity::is_alert));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serializes_upper_case() {
        let json = serde_json::to_string(&Severity::Warning).unwrap();
        assert_eq!(json, "\"WARNING\"");
    }
}
