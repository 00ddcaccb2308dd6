//! Server configuration
//!
//! A [`ServerSpec`] is the loose, user-supplied shape (the same top-level
//! fields desktop MCP clients put in their `mcpServers` blocks). It is turned
//! into a [`ServerConfig`] exactly once, by [`ServerConfig::from_spec`].
//! Everything downstream matches on [`TransportConfig`] and never looks at the
//! raw fields again.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ManagerError;

/// Raw server specification as supplied by a caller or a servers file.
///
/// Transport fields sit at the top level: `command`/`args`/`env` for a local
/// process, `url`/`headers` for a network endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub requires_auth: bool,
}

impl ServerSpec {
    /// Spec for a local process server
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: Some(command.into()),
            args,
            ..Default::default()
        }
    }

    /// Spec for a network server
    pub fn sse(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_auth(mut self, requires_auth: bool) -> Self {
        self.requires_auth = requires_auth;
        self
    }
}

/// Which kind of channel a server is reached through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Stdio,
    Sse,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Sse => "sse",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated transport parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    Stdio {
        command: String,
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    Sse {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

impl TransportConfig {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Stdio { .. } => TransportKind::Stdio,
            Self::Sse { .. } => TransportKind::Sse,
        }
    }

    /// Short human-readable target, used in log lines
    pub fn description(&self) -> String {
        match self {
            Self::Stdio { command, .. } => format!("stdio:{}", command),
            Self::Sse { url, .. } => format!("sse:{}", url),
        }
    }
}

/// A registered, validated server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub name: String,
    pub transport: TransportConfig,
    pub requires_auth: bool,
}

impl ServerConfig {
    /// The single validating constructor.
    ///
    /// A present `command` selects stdio; otherwise a present `url` selects
    /// sse. A spec with neither is rejected. A command with embedded
    /// arguments (`"npx -y @scope/server"`) and no separate `args` is split
    /// with shell-word rules.
    pub fn from_spec(name: impl Into<String>, spec: ServerSpec) -> Result<Self, ManagerError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ManagerError::Validation(
                "server name must not be empty".to_string(),
            ));
        }

        let command = spec.command.filter(|c| !c.trim().is_empty());
        let url = spec.url.filter(|u| !u.trim().is_empty());

        let transport = match (command, url) {
            (Some(command), _) => {
                let (command, args) = split_command(&name, &command, spec.args)?;
                TransportConfig::Stdio {
                    command,
                    args,
                    env: spec.env,
                }
            }
            (None, Some(url)) => {
                validate_url(&name, &url)?;
                TransportConfig::Sse {
                    url,
                    headers: spec.headers,
                }
            }
            (None, None) => {
                return Err(ManagerError::Validation(format!(
                    "server '{}' needs either a command or a url",
                    name
                )));
            }
        };

        Ok(Self {
            name,
            transport,
            requires_auth: spec.requires_auth,
        })
    }

    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// Back to the loose shape, for persistence collaborators
    pub fn to_spec(&self) -> ServerSpec {
        let mut spec = ServerSpec {
            requires_auth: self.requires_auth,
            ..Default::default()
        };
        match &self.transport {
            TransportConfig::Stdio { command, args, env } => {
                spec.command = Some(command.clone());
                spec.args = args.clone();
                spec.env = env.clone();
            }
            TransportConfig::Sse { url, headers } => {
                spec.url = Some(url.clone());
                spec.headers = headers.clone();
            }
        }
        spec
    }
}

fn split_command(
    name: &str,
    command: &str,
    args: Vec<String>,
) -> Result<(String, Vec<String>), ManagerError> {
    let command = command.trim();
    if !args.is_empty() || !command.contains(' ') {
        return Ok((command.to_string(), args));
    }

    let mut parts = shell_words::split(command).map_err(|e| {
        ManagerError::Validation(format!("server '{}' has an unparsable command: {}", name, e))
    })?;
    if parts.is_empty() {
        return Err(ManagerError::Validation(format!(
            "server '{}' has an empty command",
            name
        )));
    }
    let executable = parts.remove(0);
    Ok((executable, parts))
}

fn validate_url(name: &str, raw: &str) -> Result<(), ManagerError> {
    let parsed = url::Url::parse(raw).map_err(|e| {
        ManagerError::Validation(format!("server '{}' has an invalid url: {}", name, e))
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ManagerError::Validation(format!(
            "server '{}' url must be http or https, got '{}'",
            name, other
        ))),
    }
}
