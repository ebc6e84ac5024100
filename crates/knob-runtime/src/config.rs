//! Runtime configuration: command-line source and known value types

use std::collections::HashMap;

use knob_value::TypeRegistry;

/// Command-line arguments addressable by option name
///
/// Recognizes `--name=value`, `--name value` and bare `--name` (stored as
/// `true`). Anything else is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    arguments: HashMap<String, String>,
}

impl CommandLine {
    /// Empty command line
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse process-style arguments
    #[must_use]
    pub fn parse<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut command_line = Self::new();
        let mut pending: Option<String> = None;
        for arg in args {
            let arg = arg.as_ref();
            if let Some(option) = arg.strip_prefix("--") {
                if let Some(name) = pending.take() {
                    command_line.set(name, "true");
                }
                match option.split_once('=') {
                    Some((name, value)) => command_line.set(name, value),
                    None => pending = Some(option.to_string()),
                }
            } else if let Some(name) = pending.take() {
                command_line.set(name, arg);
            }
        }
        if let Some(name) = pending {
            command_line.set(name, "true");
        }
        command_line
    }

    /// Builder-style [`CommandLine::set`]
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Set an argument
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.arguments.insert(name.into(), value.into());
    }

    /// Remove an argument, returning its value
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.arguments.remove(name)
    }

    /// Value for `name`, or an empty string if none was given
    #[must_use]
    pub fn argument(&self, name: &str) -> String {
        self.arguments.get(name).cloned().unwrap_or_default()
    }

    /// Number of arguments
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.arguments.len()
    }

    /// Check if no arguments were given
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }
}

/// Startup configuration of a [`Runtime`](crate::Runtime)
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Source of command-line parameter values
    pub command_line: CommandLine,

    /// Value types that may appear in transferred parameters
    pub types: TypeRegistry,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command_line: CommandLine::new(),
            types: TypeRegistry::with_defaults(),
        }
    }
}

impl RuntimeConfig {
    /// Default configuration with the given command line
    #[must_use]
    pub fn with_command_line(command_line: CommandLine) -> Self {
        Self {
            command_line,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        let cl = CommandLine::parse(["prog", "--x=5", "--speed", "0.5", "--verbose", "--y="]);
        assert_eq!(cl.argument("x"), "5");
        assert_eq!(cl.argument("speed"), "0.5");
        assert_eq!(cl.argument("verbose"), "true");
        assert_eq!(cl.argument("y"), "");
        assert_eq!(cl.argument("missing"), "");
    }

    #[test]
    fn test_trailing_flag() {
        let cl = CommandLine::parse(["--a", "--b"]);
        assert_eq!(cl.argument("a"), "true");
        assert_eq!(cl.argument("b"), "true");
    }

    #[test]
    fn test_default_config_knows_builtin_types() {
        let config = RuntimeConfig::default();
        assert!(config.types.contains("int32"));
        assert!(config.command_line.is_empty());
    }
}
