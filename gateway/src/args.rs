// SPDX-License-Identifier: Apache-2.0

pub use clap::Parser;
use config::Config;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "evpn-gateway")]
#[command(version)]
#[command(about = "EVPN gateway control plane", long_about = None)]
pub struct CmdArgs {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", default_value = "config.yaml")]
    pub config: PathBuf,

    #[arg(long, value_name = "PORT", help = "The gRPC server port")]
    pub grpc_port: Option<u16>,

    #[arg(long, value_name = "PORT", help = "The HTTP gateway port")]
    pub http_port: Option<u16>,

    #[arg(long, value_name = "PATH", help = "Object store database file")]
    pub db_path: Option<PathBuf>,

    #[arg(
        long,
        value_name = "server_cert:server_key:ca_cert",
        help = "TLS files for the management surface"
    )]
    pub tls_files: Option<String>,
}

impl CmdArgs {
    /// Command-line flags win over the configuration file.
    pub fn apply(&self, config: &mut Config) {
        if let Some(grpc_port) = self.grpc_port {
            config.grpc_port = grpc_port;
        }
        if let Some(http_port) = self.http_port {
            config.http_port = http_port;
        }
        if let Some(db_path) = &self.db_path {
            config.db_path = db_path.clone();
        }
        if let Some(tls_files) = &self.tls_files {
            config.tls_files = Some(tls_files.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = CmdArgs::parse_from([
            "evpn-gateway",
            "--grpc-port",
            "55000",
            "--db-path",
            "/tmp/other.db",
        ]);
        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.grpc_port, 55000);
        assert_eq!(config.db_path, PathBuf::from("/tmp/other.db"));
        // untouched fields keep their configured values
        assert_eq!(config.http_port, 8082);
    }
}
