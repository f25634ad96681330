use std::{future::Future, time::Duration};

use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    time,
};
use tracing::{debug, warn};

use climate_common::{BoilerReadings, EbusConfig};

pub const KEEP_ALIVE_PARAMETER: &str = "SetModeOverride";

const FLOW_TEMP: &str = "FlowTemp";
const RETURN_TEMP: &str = "ReturnTemp";
const MODULATION_TEMP: &str = "ModulationTempDesired";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum BusError {
    #[error("ebusd connection: {0}")]
    Io(#[from] std::io::Error),
    #[error("ebusd replied {0}")]
    Daemon(String),
    #[error("empty reply from ebusd")]
    EmptyReply,
    #[error("ebusd request timed out")]
    Timeout,
}

pub trait BusLink: Send + Sync + 'static {
    fn send_keep_alive(&self, value: &str) -> impl Future<Output = Result<(), BusError>> + Send;
}

#[derive(Debug, Clone)]
pub struct EbusClient {
    address: String,
    circuit: String,
    timeout: Duration,
}

impl EbusClient {
    pub fn new(config: &EbusConfig) -> Self {
        Self {
            address: format!("{}:{}", config.host, config.port),
            circuit: config.circuit.clone(),
            timeout: REQUEST_TIMEOUT,
        }
    }

    pub async fn read(&self, parameter: &str) -> Result<String, BusError> {
        let reply = self
            .request(&format!("read -c {} {parameter}", self.circuit))
            .await?;
        reply.into_iter().next().ok_or(BusError::EmptyReply)
    }

    pub async fn write(&self, parameter: &str, value: &str) -> Result<(), BusError> {
        let reply = self
            .request(&format!("write -c {} {parameter} {value}", self.circuit))
            .await?;
        debug!("ebusd write {parameter}: {reply:?}");
        Ok(())
    }

    // Parameters that fail keep their previous value; the last failure is returned.
    pub async fn read_boiler(
        &self,
        previous: BoilerReadings,
    ) -> (BoilerReadings, Option<BusError>) {
        let mut readings = previous;
        let mut failure = None;
        for parameter in [FLOW_TEMP, RETURN_TEMP, MODULATION_TEMP] {
            let raw = match self.read(parameter).await {
                Ok(raw) => raw,
                Err(err) => {
                    warn!("failed to read {parameter}: {err}");
                    failure = Some(err);
                    continue;
                }
            };
            let value = parse_value(&raw);
            match parameter {
                FLOW_TEMP => readings.flow_temp = value,
                RETURN_TEMP => readings.return_temp = value,
                _ => readings.modulation_temp = value as i32,
            }
        }
        (readings, failure)
    }

    async fn request(&self, request: &str) -> Result<Vec<String>, BusError> {
        time::timeout(self.timeout, self.exchange(request))
            .await
            .map_err(|_| BusError::Timeout)?
    }

    async fn exchange(&self, request: &str) -> Result<Vec<String>, BusError> {
        debug!("ebusd request: {request}");
        let stream = TcpStream::connect(&self.address).await?;
        let (reader, mut writer) = stream.into_split();
        writer.write_all(format!("{request}\n").as_bytes()).await?;

        let mut lines = BufReader::new(reader).lines();
        let mut reply = Vec::new();
        while let Some(line) = lines.next_line().await? {
            if line.is_empty() {
                break;
            }
            reply.push(line);
        }

        if reply.is_empty() {
            return Err(BusError::EmptyReply);
        }
        if let Some(err) = reply.iter().find(|line| line.starts_with("ERR:")) {
            return Err(BusError::Daemon(err.clone()));
        }
        Ok(reply)
    }
}

impl BusLink for EbusClient {
    async fn send_keep_alive(&self, value: &str) -> Result<(), BusError> {
        self.write(KEEP_ALIVE_PARAMETER, value).await
    }
}

pub fn parse_value(raw: &str) -> f64 {
    raw.split(';')
        .next()
        .and_then(|field| field.trim().parse::<f64>().ok())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        net::TcpListener,
    };

    use super::*;

    type Requests = Arc<Mutex<Vec<String>>>;

    async fn fake_daemon(respond: fn(&str) -> &'static str) -> (EbusClient, Requests) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests: Requests = Arc::default();

        let seen = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let (reader, mut writer) = stream.into_split();
                let mut lines = BufReader::new(reader).lines();
                if let Ok(Some(line)) = lines.next_line().await {
                    let reply = respond(&line);
                    seen.lock().unwrap().push(line);
                    let _ = writer.write_all(reply.as_bytes()).await;
                }
            }
        });

        let client = EbusClient::new(&EbusConfig {
            host: "127.0.0.1".to_string(),
            port,
            circuit: "BAI".to_string(),
            ..EbusConfig::default()
        });
        (client, requests)
    }

    #[test]
    fn parses_first_field() {
        assert_eq!(parse_value("32.94;65008;ok"), 32.94);
        assert_eq!(parse_value("41.5"), 41.5);
        assert_eq!(parse_value("-;ok"), 0.0);
        assert_eq!(parse_value(""), 0.0);
    }

    #[tokio::test]
    async fn read_sends_circuit_scoped_request() {
        let (client, requests) = fake_daemon(|_| "38.25;ok\n\n").await;

        assert_eq!(client.read("FlowTemp").await.unwrap(), "38.25;ok");
        assert_eq!(*requests.lock().unwrap(), vec!["read -c BAI FlowTemp".to_string()]);
    }

    #[tokio::test]
    async fn keep_alive_writes_override() {
        let (client, requests) = fake_daemon(|_| "done\n\n").await;

        client
            .send_keep_alive("0;42;48;-;-;0;0;0;-;0;0;0")
            .await
            .unwrap();
        assert_eq!(
            *requests.lock().unwrap(),
            vec!["write -c BAI SetModeOverride 0;42;48;-;-;0;0;0;-;0;0;0".to_string()]
        );
    }

    #[tokio::test]
    async fn daemon_error_fails_request() {
        let (client, _) = fake_daemon(|_| "ERR: element not found\n\n").await;

        let err = client.read("FlowTemp").await.unwrap_err();
        assert!(matches!(err, BusError::Daemon(line) if line == "ERR: element not found"));
    }

    #[tokio::test]
    async fn empty_reply_is_an_error() {
        let (client, _) = fake_daemon(|_| "\n").await;
        assert!(matches!(client.read("FlowTemp").await, Err(BusError::EmptyReply)));
    }

    #[tokio::test]
    async fn boiler_read_keeps_previous_on_failure() {
        let (client, _) = fake_daemon(|request| {
            if request.ends_with("FlowTemp") {
                "44.5;65008;ok\n\n"
            } else if request.ends_with("ReturnTemp") {
                "ERR: SYN received\n\n"
            } else {
                "17\n\n"
            }
        })
        .await;

        let previous = BoilerReadings {
            flow_temp: 30.0,
            return_temp: 28.0,
            modulation_temp: 0,
        };
        let (readings, failure) = client.read_boiler(previous).await;

        assert_eq!(readings.flow_temp, 44.5);
        assert_eq!(readings.return_temp, 28.0);
        assert_eq!(readings.modulation_temp, 17);
        assert!(matches!(failure, Some(BusError::Daemon(line)) if line == "ERR: SYN received"));
    }

    #[tokio::test]
    async fn clean_boiler_read_reports_no_failure() {
        let (client, requests) = fake_daemon(|_| "40;ok\n\n").await;

        let (readings, failure) = client.read_boiler(BoilerReadings::default()).await;

        assert!(failure.is_none());
        assert_eq!(readings.flow_temp, 40.0);
        assert_eq!(requests.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn unreachable_daemon_is_io_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = EbusClient::new(&EbusConfig {
            host: "127.0.0.1".to_string(),
            port,
            circuit: "BAI".to_string(),
            ..EbusConfig::default()
        });
        assert!(matches!(client.read("FlowTemp").await, Err(BusError::Io(_))));
    }
}
