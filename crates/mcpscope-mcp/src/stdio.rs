//! STDIO transport
//!
//! Spawns the server as a child process and speaks MCP over its
//! stdin/stdout.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

#[cfg(windows)]
#[allow(unused_imports)] // Trait is used via method call in closure
use std::os::windows::process::CommandExt;

use mcpscope_core::{ClosedNotifier, TransportError};
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use rmcp::ServiceExt;
use tokio::process::Command;
use tracing::{error, info};

use crate::channel::RmcpChannel;
use crate::handler::McpClientHandler;

pub(crate) async fn open(
    server_name: &str,
    command: &str,
    args: &[String],
    env: &HashMap<String, String>,
    handshake_timeout: Duration,
    notifier: ClosedNotifier,
) -> Result<Arc<RmcpChannel>, TransportError> {
    info!(
        server = %server_name,
        command = %command,
        args = ?args,
        channel_id = notifier.channel_id(),
        "Connecting to STDIO server"
    );

    let args = args.to_vec();
    let env = env.clone();
    let transport = TokioChildProcess::new(Command::new(command).configure(move |cmd| {
        cmd.args(&args)
            .envs(&env)
            .stderr(Stdio::null())
            .kill_on_drop(true);

        // Keep terminal signals aimed at the inspector away from its servers.
        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }
    }))
    .map_err(|e| {
        error!(server = %server_name, command = %command, error = %e, "Failed to spawn process");
        TransportError::Spawn {
            command: command.to_string(),
            message: e.to_string(),
        }
    })?;

    let handler = McpClientHandler::new(server_name);
    let client = match tokio::time::timeout(handshake_timeout, handler.serve(transport)).await {
        Ok(Ok(client)) => client,
        Ok(Err(e)) => {
            error!(server = %server_name, error = %e, "MCP handshake failed");
            return Err(TransportError::Handshake(e.to_string()));
        }
        Err(_) => {
            error!(server = %server_name, timeout = ?handshake_timeout, "MCP handshake timed out");
            return Err(TransportError::Handshake(format!(
                "no initialize response within {:?}",
                handshake_timeout
            )));
        }
    };

    info!(server = %server_name, "STDIO server connected");
    Ok(RmcpChannel::spawn(server_name, client, notifier))
}
