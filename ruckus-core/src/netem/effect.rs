//! Netem effects and their token sequences.
//!
//! Each constructor validates its parameters and returns the effect or a
//! [`ValidationError`]; [`NetemEffect::tokens`] renders the validated effect
//! as the arguments that follow `netem` on a `tc qdisc add` line.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ValidationError;

/// Accepted delay distributions (empty means none).
pub const DELAY_DISTRIBUTIONS: [&str; 5] = ["", "uniform", "normal", "pareto", "paretonormal"];

/// One netem directive.
#[derive(Debug, Clone, PartialEq)]
pub enum NetemEffect {
    /// Fixed delay with optional jitter, correlation and distribution.
    Delay {
        /// Delay in milliseconds.
        time_ms: i64,
        /// Jitter in milliseconds.
        jitter_ms: i64,
        /// Correlation percent.
        correlation: f64,
        /// Distribution name or empty.
        distribution: String,
    },
    /// Independent packet loss.
    Loss {
        /// Loss percent.
        percent: f64,
        /// Correlation percent.
        correlation: f64,
    },
    /// Gilbert-Elliot loss model.
    LossGe {
        /// Good to bad transition probability.
        pg: f64,
        /// Bad to good transition probability.
        pb: f64,
        /// Loss probability in the bad state, as `1-h`.
        one_h: f64,
        /// Loss probability in the good state, as `1-k`.
        one_k: f64,
    },
    /// 4-state Markov loss model.
    LossState {
        /// Transition probability 1 to 3.
        p13: f64,
        /// Transition probability 3 to 1.
        p31: f64,
        /// Transition probability 3 to 2.
        p32: f64,
        /// Transition probability 2 to 3.
        p23: f64,
        /// Transition probability 1 to 4.
        p14: f64,
    },
    /// Packet duplication.
    Duplicate {
        /// Duplicate percent.
        percent: f64,
        /// Correlation percent.
        correlation: f64,
    },
    /// Single-bit packet corruption.
    Corrupt {
        /// Corrupt percent.
        percent: f64,
        /// Correlation percent.
        correlation: f64,
    },
    /// Egress rate limit.
    Rate {
        /// Rate such as `100mbit`.
        rate: String,
        /// Per-packet overhead in bytes (may be negative).
        packet_overhead: i64,
        /// Link layer cell size.
        cell_size: i64,
        /// Per-cell overhead in bytes (may be negative).
        cell_overhead: i64,
    },
}

fn check_percent(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::PercentOutOfRange { field, value })
    }
}

static RE_RATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+[gmk]?bit$").unwrap());

fn percent_token(value: f64) -> String {
    format!("{value:.2}")
}

impl NetemEffect {
    /// `delay TIMEms [JITTERms [CORR]] [distribution NAME]`.
    pub fn delay(
        time_ms: i64,
        jitter_ms: i64,
        correlation: f64,
        distribution: &str,
    ) -> Result<Self, ValidationError> {
        if time_ms <= 0 {
            return Err(ValidationError::NonPositiveDelay(time_ms));
        }
        if jitter_ms < 0 || jitter_ms > time_ms {
            return Err(ValidationError::JitterOutOfRange {
                jitter: jitter_ms,
                time: time_ms,
            });
        }
        check_percent("delay correlation", correlation)?;
        if !DELAY_DISTRIBUTIONS.contains(&distribution) {
            return Err(ValidationError::UnknownDistribution(distribution.to_string()));
        }
        Ok(Self::Delay {
            time_ms,
            jitter_ms,
            correlation,
            distribution: distribution.to_string(),
        })
    }

    /// `loss PERCENT [CORR]`.
    pub fn loss(percent: f64, correlation: f64) -> Result<Self, ValidationError> {
        check_percent("loss percent", percent)?;
        check_percent("loss correlation", correlation)?;
        Ok(Self::Loss {
            percent,
            correlation,
        })
    }

    /// `loss gemodel PG PB 1-H 1-K`.
    pub fn loss_gemodel(pg: f64, pb: f64, one_h: f64, one_k: f64) -> Result<Self, ValidationError> {
        check_percent("loss-gemodel pg", pg)?;
        check_percent("loss-gemodel pb", pb)?;
        check_percent("loss-gemodel one-h", one_h)?;
        check_percent("loss-gemodel one-k", one_k)?;
        Ok(Self::LossGe { pg, pb, one_h, one_k })
    }

    /// `loss state P13 P31 P32 P23 P14`.
    pub fn loss_state(
        p13: f64,
        p31: f64,
        p32: f64,
        p23: f64,
        p14: f64,
    ) -> Result<Self, ValidationError> {
        check_percent("loss-state p13", p13)?;
        check_percent("loss-state p31", p31)?;
        check_percent("loss-state p32", p32)?;
        check_percent("loss-state p23", p23)?;
        check_percent("loss-state p14", p14)?;
        Ok(Self::LossState {
            p13,
            p31,
            p32,
            p23,
            p14,
        })
    }

    /// `duplicate PERCENT [CORR]`.
    pub fn duplicate(percent: f64, correlation: f64) -> Result<Self, ValidationError> {
        check_percent("duplicate percent", percent)?;
        check_percent("duplicate correlation", correlation)?;
        Ok(Self::Duplicate {
            percent,
            correlation,
        })
    }

    /// `corrupt PERCENT [CORR]`.
    pub fn corrupt(percent: f64, correlation: f64) -> Result<Self, ValidationError> {
        check_percent("corrupt percent", percent)?;
        check_percent("corrupt correlation", correlation)?;
        Ok(Self::Corrupt {
            percent,
            correlation,
        })
    }

    /// `rate RATE [PACKETOVERHEAD [CELLSIZE [CELLOVERHEAD]]]`.
    pub fn rate(
        rate: &str,
        packet_overhead: i64,
        cell_size: i64,
        cell_overhead: i64,
    ) -> Result<Self, ValidationError> {
        if !RE_RATE.is_match(rate) {
            return Err(ValidationError::InvalidRate(rate.to_string()));
        }
        if cell_size < 0 {
            return Err(ValidationError::NegativeCellSize(cell_size));
        }
        Ok(Self::Rate {
            rate: rate.to_string(),
            packet_overhead,
            cell_size,
            cell_overhead,
        })
    }

    /// Short effect name used in logs and error context.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Delay { .. } => "netem delay",
            Self::Loss { .. } => "netem loss",
            Self::LossGe { .. } => "netem loss-gemodel",
            Self::LossState { .. } => "netem loss-state",
            Self::Duplicate { .. } => "netem duplicate",
            Self::Corrupt { .. } => "netem corrupt",
            Self::Rate { .. } => "netem rate",
        }
    }

    /// Arguments following `netem` on the `tc qdisc add` line.
    pub fn tokens(&self) -> Vec<String> {
        match self {
            Self::Delay {
                time_ms,
                jitter_ms,
                correlation,
                distribution,
            } => {
                let mut tokens = vec!["delay".to_string(), format!("{time_ms}ms")];
                if *jitter_ms > 0 {
                    tokens.push(format!("{jitter_ms}ms"));
                }
                if *correlation > 0.0 {
                    tokens.push(percent_token(*correlation));
                }
                if !distribution.is_empty() {
                    tokens.push("distribution".into());
                    tokens.push(distribution.clone());
                }
                tokens
            }
            Self::Loss {
                percent,
                correlation,
            } => with_correlation("loss", *percent, *correlation),
            Self::Duplicate {
                percent,
                correlation,
            } => with_correlation("duplicate", *percent, *correlation),
            Self::Corrupt {
                percent,
                correlation,
            } => with_correlation("corrupt", *percent, *correlation),
            Self::LossGe { pg, pb, one_h, one_k } => {
                let mut tokens = vec!["loss".to_string(), "gemodel".to_string()];
                tokens.extend([pg, pb, one_h, one_k].map(|p| percent_token(*p)));
                tokens
            }
            Self::LossState {
                p13,
                p31,
                p32,
                p23,
                p14,
            } => {
                let mut tokens = vec!["loss".to_string(), "state".to_string()];
                tokens.extend([p13, p31, p32, p23, p14].map(|p| percent_token(*p)));
                tokens
            }
            Self::Rate {
                rate,
                packet_overhead,
                cell_size,
                cell_overhead,
            } => {
                let mut tokens = vec!["rate".to_string(), rate.clone()];
                if *packet_overhead != 0 {
                    tokens.push(packet_overhead.to_string());
                }
                if *cell_size > 0 {
                    tokens.push(cell_size.to_string());
                }
                if *cell_overhead != 0 {
                    tokens.push(cell_overhead.to_string());
                }
                tokens
            }
        }
    }
}

fn with_correlation(name: &str, percent: f64, correlation: f64) -> Vec<String> {
    let mut tokens = vec![name.to_string(), percent_token(percent)];
    if correlation > 0.0 {
        tokens.push(percent_token(correlation));
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loss_tokens() {
        let effect = NetemEffect::loss(10.0, 5.0).unwrap();
        assert_eq!(effect.tokens(), vec!["loss", "10.00", "5.00"]);

        let effect = NetemEffect::loss(10.0, 0.0).unwrap();
        assert_eq!(effect.tokens(), vec!["loss", "10.00"]);
    }

    #[test]
    fn duplicate_and_corrupt_tokens() {
        let effect = NetemEffect::duplicate(10.0, 5.0).unwrap();
        assert_eq!(effect.tokens(), vec!["duplicate", "10.00", "5.00"]);

        let effect = NetemEffect::corrupt(2.5, 0.0).unwrap();
        assert_eq!(effect.tokens(), vec!["corrupt", "2.50"]);
    }

    #[test]
    fn rate_tokens() {
        let effect = NetemEffect::rate("100mbit", 10, 20, 30).unwrap();
        assert_eq!(effect.tokens(), vec!["rate", "100mbit", "10", "20", "30"]);

        let effect = NetemEffect::rate("56kbit", 0, 0, 0).unwrap();
        assert_eq!(effect.tokens(), vec!["rate", "56kbit"]);
    }

    #[test]
    fn gemodel_tokens() {
        let effect = NetemEffect::loss_gemodel(30.0, 70.0, 50.0, 10.0).unwrap();
        assert_eq!(
            effect.tokens(),
            vec!["loss", "gemodel", "30.00", "70.00", "50.00", "10.00"]
        );
    }

    #[test]
    fn loss_state_tokens() {
        let effect = NetemEffect::loss_state(20.0, 80.0, 30.0, 40.0, 10.0).unwrap();
        assert_eq!(
            effect.tokens(),
            vec!["loss", "state", "20.00", "80.00", "30.00", "40.00", "10.00"]
        );
    }

    #[test]
    fn delay_tokens() {
        let effect = NetemEffect::delay(100, 10, 25.0, "normal").unwrap();
        assert_eq!(
            effect.tokens(),
            vec!["delay", "100ms", "10ms", "25.00", "distribution", "normal"]
        );

        let effect = NetemEffect::delay(100, 0, 0.0, "").unwrap();
        assert_eq!(effect.tokens(), vec!["delay", "100ms"]);
    }

    #[test]
    fn percent_fields_reject_out_of_range() {
        for bad in [-0.1, 100.1, -50.0, 1000.0] {
            assert!(NetemEffect::loss(bad, 0.0).is_err());
            assert!(NetemEffect::loss(10.0, bad).is_err());
            assert!(NetemEffect::duplicate(bad, 0.0).is_err());
            assert!(NetemEffect::duplicate(10.0, bad).is_err());
            assert!(NetemEffect::corrupt(bad, 0.0).is_err());
            assert!(NetemEffect::corrupt(10.0, bad).is_err());
            assert!(NetemEffect::delay(100, 10, bad, "").is_err());

            assert!(NetemEffect::loss_gemodel(bad, 1.0, 1.0, 1.0).is_err());
            assert!(NetemEffect::loss_gemodel(1.0, bad, 1.0, 1.0).is_err());
            assert!(NetemEffect::loss_gemodel(1.0, 1.0, bad, 1.0).is_err());
            assert!(NetemEffect::loss_gemodel(1.0, 1.0, 1.0, bad).is_err());

            assert!(NetemEffect::loss_state(bad, 1.0, 1.0, 1.0, 1.0).is_err());
            assert!(NetemEffect::loss_state(1.0, bad, 1.0, 1.0, 1.0).is_err());
            assert!(NetemEffect::loss_state(1.0, 1.0, bad, 1.0, 1.0).is_err());
            assert!(NetemEffect::loss_state(1.0, 1.0, 1.0, bad, 1.0).is_err());
            assert!(NetemEffect::loss_state(1.0, 1.0, 1.0, 1.0, bad).is_err());
        }
    }

    #[test]
    fn percent_bounds_are_inclusive() {
        assert!(NetemEffect::loss(0.0, 100.0).is_ok());
        assert!(NetemEffect::loss(100.0, 0.0).is_ok());
        assert!(NetemEffect::loss_state(0.0, 100.0, 0.0, 100.0, 0.0).is_ok());
    }

    #[test]
    fn percent_error_names_field() {
        let err = NetemEffect::loss_gemodel(1.0, 101.0, 1.0, 1.0).unwrap_err();
        assert_eq!(
            err,
            ValidationError::PercentOutOfRange {
                field: "loss-gemodel pb",
                value: 101.0
            }
        );
    }

    #[test]
    fn delay_time_and_jitter_bounds() {
        assert!(NetemEffect::delay(0, 0, 0.0, "").is_err());
        assert!(NetemEffect::delay(-1, 0, 0.0, "").is_err());
        assert!(NetemEffect::delay(100, -1, 0.0, "").is_err());
        assert!(NetemEffect::delay(100, 101, 0.0, "").is_err());
        assert!(NetemEffect::delay(100, 100, 0.0, "").is_ok());
    }

    #[test]
    fn delay_distribution_must_be_known() {
        for d in DELAY_DISTRIBUTIONS {
            assert!(NetemEffect::delay(100, 10, 0.0, d).is_ok());
        }
        assert_eq!(
            NetemEffect::delay(100, 10, 0.0, "gaussian"),
            Err(ValidationError::UnknownDistribution("gaussian".into()))
        );
    }

    #[test]
    fn rate_validation() {
        for good in ["100mbit", "1gbit", "56kbit", "800bit"] {
            assert!(NetemEffect::rate(good, 0, 0, 0).is_ok(), "{good}");
        }
        for bad in ["", "100", "100mbps", "mbit", "10 mbit", "100mbit; rm -rf /"] {
            assert!(NetemEffect::rate(bad, 0, 0, 0).is_err(), "{bad}");
        }
        assert_eq!(
            NetemEffect::rate("1mbit", 0, -1, 0),
            Err(ValidationError::NegativeCellSize(-1))
        );
    }
}
