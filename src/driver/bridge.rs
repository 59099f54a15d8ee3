//! Line-oriented JSON bridge
//!
//! Readings and consumer requests arrive as one JSON object per line on stdin;
//! actuator commands leave the same way on stdout.

use super::DriverCommand;
use crate::actuator::ActuatorCommand;
use crate::error::Result;
use crate::logging::get_logger;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One inbound line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeMessage {
    Reading {
        entity: String,
        value: Value,
        #[serde(default)]
        unit: Option<String>,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    RequestOn {
        consumer: String,
    },
    RequestOff {
        consumer: String,
    },
    RaiseCurrent {
        consumer: String,
        current: f64,
    },
}

impl From<BridgeMessage> for DriverCommand {
    fn from(msg: BridgeMessage) -> Self {
        match msg {
            BridgeMessage::Reading {
                entity,
                value,
                unit,
                timestamp,
            } => DriverCommand::Reading {
                entity,
                value,
                unit,
                timestamp,
            },
            BridgeMessage::RequestOn { consumer } => DriverCommand::RequestOn { consumer },
            BridgeMessage::RequestOff { consumer } => DriverCommand::RequestOff { consumer },
            BridgeMessage::RaiseCurrent { consumer, current } => {
                DriverCommand::RaiseCurrent { consumer, current }
            }
        }
    }
}

/// Parse one line; blank lines yield `None`
pub fn parse_line(line: &str) -> Result<Option<BridgeMessage>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line)?))
}

/// Forward every valid line as a driver command; returns how many were forwarded
pub async fn forward_lines<R>(reader: R, tx: &mpsc::UnboundedSender<DriverCommand>) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let logger = get_logger("bridge");
    let mut lines = reader.lines();
    let mut forwarded = 0;
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            Ok(Some(msg)) => {
                if tx.send(msg.into()).is_err() {
                    logger.warn("Driver stopped, no longer forwarding input");
                    break;
                }
                forwarded += 1;
            }
            Ok(None) => {}
            Err(e) => logger.warn(&format!("Skipping invalid line: {}", e)),
        }
    }
    Ok(forwarded)
}

/// Write each command as one JSON line until the channel closes
pub async fn write_commands<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<ActuatorCommand>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(cmd) = rx.recv().await {
        let mut line = serde_json::to_string(&cmd)?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}

/// Read stdin until EOF, then request shutdown
pub fn spawn_stdin_reader(tx: mpsc::UnboundedSender<DriverCommand>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let logger = get_logger("bridge");
        let reader = BufReader::new(tokio::io::stdin());
        match forward_lines(reader, &tx).await {
            Ok(n) => logger.info(&format!("stdin closed after {} messages", n)),
            Err(e) => logger.error(&format!("Reading stdin failed: {}", e)),
        }
        let _ = tx.send(DriverCommand::Shutdown);
    })
}

pub fn spawn_stdout_writer(rx: mpsc::UnboundedReceiver<ActuatorCommand>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = write_commands(tokio::io::stdout(), rx).await {
            get_logger("bridge").error(&format!("Writing stdout failed: {}", e));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reading_with_optional_fields() {
        let msg = parse_line(r#"{"type":"reading","entity":"sensor.x","value":"12.5"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            msg,
            BridgeMessage::Reading {
                entity: "sensor.x".to_string(),
                value: Value::from("12.5"),
                unit: None,
                timestamp: None,
            }
        );

        let msg = parse_line(
            r#"{"type":"reading","entity":"sensor.x","value":3,"unit":"W","timestamp":"2024-06-01T12:00:00Z"}"#,
        )
        .unwrap()
        .unwrap();
        assert!(matches!(
            msg,
            BridgeMessage::Reading { unit: Some(ref u), timestamp: Some(_), .. } if u == "W"
        ));
    }

    #[test]
    fn blank_and_invalid_lines() {
        assert!(parse_line("   ").unwrap().is_none());
        assert!(parse_line("{not json").is_err());
        assert!(parse_line(r#"{"type":"dance"}"#).is_err());
        assert!(parse_line(r#"{"type":"raise_current","consumer":"a/b"}"#).is_err());
    }

    #[test]
    fn messages_convert_to_commands() {
        let cmd: DriverCommand = BridgeMessage::RaiseCurrent {
            consumer: "garage/wallbox".to_string(),
            current: 16000.0,
        }
        .into();
        assert_eq!(
            cmd,
            DriverCommand::RaiseCurrent {
                consumer: "garage/wallbox".to_string(),
                current: 16000.0
            }
        );
    }
}
