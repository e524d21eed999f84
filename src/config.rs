use std::env;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::core::Alphabet;

/// Environment variable holding the number of modules; 0 or unset means learn it from the display.
pub const MODULE_COUNT_VAR: &str = "SPLITFLAP_MODULE_COUNT";

/// Environment variable holding the characters on each module's flaps, in order.
pub const ALPHABET_VAR: &str = "ALPHABET_ORDER";

/// Environment variable naming the serial port; the first available port is used if unset.
pub const SERIAL_PORT_VAR: &str = "SPLITFLAP_SERIAL_PORT";

/// Environment variable holding the acknowledgment timeout in milliseconds.
pub const RETRY_MS_VAR: &str = "SPLITFLAP_RETRY_MS";

/// Environment variable holding the [`FailurePolicy`], `drop_backlog` or `drop_message`.
///
/// [`FailurePolicy`]: enum.FailurePolicy.html
pub const FAILURE_POLICY_VAR: &str = "SPLITFLAP_FAILURE_POLICY";

/// Errors related to loading a [`Config`].
///
/// [`Config`]: struct.Config.html
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required setting was not provided.
    #[error("Missing required setting {}", name)]
    Missing {
        /// Name of the setting.
        name: &'static str,
    },

    /// A setting was provided but couldn't be used.
    #[error("Invalid value {:?} for {}: {}", value, name, reason)]
    Invalid {
        /// Name of the setting.
        name: &'static str,

        /// The value provided.
        value: String,

        /// Why it was rejected.
        reason: String,
    },

    /// A failure policy name wasn't recognized.
    #[error("Unknown failure policy {:?}, expected drop_backlog or drop_message", value)]
    UnknownFailurePolicy {
        /// The unrecognized name.
        value: String,
    },
}

/// What to do when a message goes unacknowledged even after a retry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FailurePolicy {
    /// Discard the message and everything queued behind it, assuming the backlog is stale.
    DropBacklog,
    /// Discard only the failed message and carry on with the rest of the queue.
    DropMessage,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::DropBacklog
    }
}

impl FromStr for FailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drop_backlog" => Ok(FailurePolicy::DropBacklog),
            "drop_message" => Ok(FailurePolicy::DropMessage),
            _ => Err(ConfigError::UnknownFailurePolicy { value: s.to_string() }),
        }
    }
}

impl Display for FailurePolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match *self {
            FailurePolicy::DropBacklog => "drop_backlog",
            FailurePolicy::DropMessage => "drop_message",
        };
        write!(f, "{}", name)
    }
}

/// Settings for a [`Splitflap`] session, read once at startup.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use splitflap::{Config, FailurePolicy};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// #
/// let config = Config::from_lookup(|name| match name {
///     "ALPHABET_ORDER" => Some(" ABCDEFGHIJKLMNOPQRSTUVWXYZ".to_string()),
///     "SPLITFLAP_MODULE_COUNT" => Some("12".to_string()),
///     _ => None,
/// })?;
///
/// assert_eq!(12, config.module_count);
/// assert_eq!(Duration::from_millis(500), config.retry_timeout);
/// assert_eq!(FailurePolicy::DropBacklog, config.failure_policy);
/// #
/// # Ok(()) }
/// ```
///
/// [`Splitflap`]: struct.Splitflap.html
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Number of modules, or 0 to learn it from the display's first state report.
    pub module_count: usize,

    /// Characters on each module's flaps, in order.
    pub alphabet: Alphabet,

    /// Serial port to open, or `None` for the first available one.
    pub serial_port: Option<String>,

    /// How long to wait for each acknowledgment before retrying.
    pub retry_timeout: Duration,

    /// What to do with the queue when a message fails twice.
    pub failure_policy: FailurePolicy,
}

impl Config {
    /// Default time to wait for an acknowledgment.
    pub const DEFAULT_RETRY_TIMEOUT: Duration = Duration::from_millis(500);

    /// Creates a configuration with the given alphabet and defaults for everything else.
    pub fn new(alphabet: Alphabet) -> Self {
        Config {
            module_count: 0,
            alphabet,
            serial_port: None,
            retry_timeout: Config::DEFAULT_RETRY_TIMEOUT,
            failure_policy: FailurePolicy::default(),
        }
    }

    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`from_lookup`].
    ///
    /// [`from_lookup`]: #method.from_lookup
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::from_lookup(|name| env::var(name).ok())
    }

    /// Reads the configuration using `lookup` to fetch each variable by name.
    ///
    /// Empty values are treated the same as missing ones.
    ///
    /// # Errors
    ///
    /// Returns:
    /// * [`ConfigError::Missing`] if `ALPHABET_ORDER` isn't set.
    /// * [`ConfigError::Invalid`] if any value can't be parsed, or the alphabet is empty or has duplicates.
    ///
    /// [`ConfigError::Missing`]: enum.ConfigError.html#variant.Missing
    /// [`ConfigError::Invalid`]: enum.ConfigError.html#variant.Invalid
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.is_empty());

        let order = get(ALPHABET_VAR).ok_or(ConfigError::Missing { name: ALPHABET_VAR })?;
        let alphabet = parse(ALPHABET_VAR, &order, Alphabet::new)?;
        let mut config = Config::new(alphabet);

        if let Some(value) = get(MODULE_COUNT_VAR) {
            config.module_count = parse(MODULE_COUNT_VAR, &value, |v| v.trim().parse::<usize>())?;
        }

        config.serial_port = get(SERIAL_PORT_VAR);

        if let Some(value) = get(RETRY_MS_VAR) {
            let millis = parse(RETRY_MS_VAR, &value, |v| v.trim().parse::<u64>())?;
            if millis == 0 {
                return Err(ConfigError::Invalid {
                    name: RETRY_MS_VAR,
                    value,
                    reason: "must be greater than zero".to_string(),
                });
            }
            config.retry_timeout = Duration::from_millis(millis);
        }

        if let Some(value) = get(FAILURE_POLICY_VAR) {
            config.failure_policy = parse(FAILURE_POLICY_VAR, &value, |v| v.trim().parse::<FailurePolicy>())?;
        }

        Ok(config)
    }
}

/// Parses `value` with `f`, attributing any failure to the setting `name`.
fn parse<T, E, F>(name: &'static str, value: &str, f: F) -> Result<T, ConfigError>
where
    E: Display,
    F: FnOnce(&str) -> Result<T, E>,
{
    f(value).map_err(|e| ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use test_case::test_case;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|&(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::from_lookup(lookup(&[("ALPHABET_ORDER", " AB")])).unwrap();
        assert_eq!(Config::new(Alphabet::new(" AB").unwrap()), config);
        assert_eq!(0, config.module_count);
        assert_eq!(None, config.serial_port);
        assert_eq!(Duration::from_millis(500), config.retry_timeout);
        assert_eq!(FailurePolicy::DropBacklog, config.failure_policy);
    }

    #[test]
    fn all_settings() {
        let config = Config::from_lookup(lookup(&[
            ("ALPHABET_ORDER", " ABC"),
            ("SPLITFLAP_MODULE_COUNT", "18"),
            ("SPLITFLAP_SERIAL_PORT", "/dev/ttyACM0"),
            ("SPLITFLAP_RETRY_MS", "250"),
            ("SPLITFLAP_FAILURE_POLICY", "drop_message"),
        ]))
        .unwrap();

        assert_eq!(18, config.module_count);
        assert_eq!(3, config.alphabet.index_of('C'));
        assert_eq!(Some("/dev/ttyACM0".to_string()), config.serial_port);
        assert_eq!(Duration::from_millis(250), config.retry_timeout);
        assert_eq!(FailurePolicy::DropMessage, config.failure_policy);
    }

    #[test_case(&[] ; "unset")]
    #[test_case(&[("ALPHABET_ORDER", "")] ; "empty")]
    fn missing_alphabet(vars: &[(&str, &str)]) {
        let error = Config::from_lookup(lookup(vars)).unwrap_err();
        assert!(matches!(error, ConfigError::Missing { name: "ALPHABET_ORDER" }));
    }

    #[test_case("ALPHABET_ORDER", " ABA" ; "duplicate character")]
    #[test_case("SPLITFLAP_MODULE_COUNT", "twelve" ; "module count not a number")]
    #[test_case("SPLITFLAP_MODULE_COUNT", "-1" ; "module count negative")]
    #[test_case("SPLITFLAP_RETRY_MS", "0" ; "zero retry")]
    #[test_case("SPLITFLAP_RETRY_MS", "1.5" ; "fractional retry")]
    #[test_case("SPLITFLAP_FAILURE_POLICY", "retry_forever" ; "unknown policy")]
    fn invalid(name: &str, value: &str) {
        let mut vars = vec![("ALPHABET_ORDER", " ABC")];
        vars.retain(|&(k, _)| k != name);
        vars.push((name, value));

        let error = Config::from_lookup(lookup(&vars)).unwrap_err();
        match error {
            ConfigError::Invalid {
                name: actual_name,
                value: ref actual_value,
                ..
            } => {
                assert_eq!(name, actual_name);
                assert_eq!(value, actual_value);
            }
            _ => panic!("Unexpected error: {}", error),
        }
    }

    #[test]
    fn failure_policy_parse_error() {
        let error = "retry_forever".parse::<FailurePolicy>().unwrap_err();
        assert!(matches!(error, ConfigError::UnknownFailurePolicy { ref value } if value == "retry_forever"));
    }

    #[test_case("drop_backlog", FailurePolicy::DropBacklog ; "drop backlog")]
    #[test_case("drop_message", FailurePolicy::DropMessage ; "drop message")]
    fn failure_policy_names(name: &str, policy: FailurePolicy) {
        assert_eq!(policy, name.parse::<FailurePolicy>().unwrap());
        assert_eq!(name, policy.to_string());
    }
}
