//! Command-line arguments parsing.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use slog::{info, trace, Logger};

use crate::metadata::{Matcher, METADATA_SERVICE_READY_TIMEOUT, VNIC_ATTACHMENT_READY_TIMEOUT};
use crate::network::{DatalinkResolver, HardwareAddressResolver, IpLinkResolver};
use crate::profile::{EmitOutcome, ProfileWriter, PROFILE_DIR, PROFILE_TEMPLATE_PATH};
use crate::providers::oraclecloud::OracleCloudProvider;
use crate::providers::MetadataProvider;
use crate::retry::Clock;

/// Generate the network profile of a hot-plugged VNIC
#[derive(Debug, Parser)]
#[command(name = "oci-vnic", version)]
pub(crate) struct CliConfig {
    /// The network interface to configure
    #[arg(value_name = "interface")]
    interface: String,
    /// The template rendered into the interface profile
    #[arg(long, value_name = "path", default_value = PROFILE_TEMPLATE_PATH)]
    template: PathBuf,
    /// The directory into which the interface profile is written
    #[arg(long = "profile-dir", value_name = "path", default_value = PROFILE_DIR)]
    profile_dir: PathBuf,
    /// How to look up the interface hardware address
    #[arg(long, value_enum, default_value_t = ResolverKind::Ip)]
    resolver: ResolverKind,
    /// Seconds to wait for the metadata service to answer
    #[arg(long = "metadata-timeout", value_name = "secs", default_value_t = METADATA_SERVICE_READY_TIMEOUT.as_secs())]
    metadata_timeout: u64,
    /// Seconds to wait for the VNIC to be attached
    #[arg(long = "attachment-timeout", value_name = "secs", default_value_t = VNIC_ATTACHMENT_READY_TIMEOUT.as_secs())]
    attachment_timeout: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum ResolverKind {
    /// Parse `ip link show` output
    Ip,
    /// Query the kernel interface list directly
    Native,
}

impl CliConfig {
    /// Configure the requested interface.
    pub fn run(self, log: &Logger) -> Result<()> {
        let provider = OracleCloudProvider::try_new(log.clone())?;
        self.run_with_provider(log, &provider)
    }

    fn run_with_provider<P>(self, log: &Logger, provider: &P) -> Result<()>
    where
        P: MetadataProvider + ?Sized,
    {
        let resolver: Box<dyn HardwareAddressResolver> = match self.resolver {
            ResolverKind::Ip => Box::new(IpLinkResolver::new(log.clone())),
            ResolverKind::Native => Box::new(DatalinkResolver::new(log.clone())),
        };
        let matcher = Matcher::new(provider, log.clone())
            .metadata_timeout(Duration::from_secs(self.metadata_timeout))
            .attachment_timeout(Duration::from_secs(self.attachment_timeout));
        let writer = ProfileWriter::new(self.profile_dir, self.template, log.clone());

        configure_interface(log, &self.interface, resolver.as_ref(), &matcher, &writer)?;
        Ok(())
    }
}

/// Resolve, match and write the profile of a single interface.
pub(crate) fn configure_interface<P, C>(
    log: &Logger,
    interface_name: &str,
    resolver: &dyn HardwareAddressResolver,
    matcher: &Matcher<'_, P, C>,
    writer: &ProfileWriter,
) -> Result<EmitOutcome>
where
    P: MetadataProvider + ?Sized,
    C: Clock,
{
    let mac = resolver.resolve_hardware_address(interface_name)?;
    info!(log, "resolved hardware address"; "interface" => interface_name, "mac" => &mac);

    let resolved = matcher
        .resolve(interface_name, &mac)
        .context("matching vnic metadata")?;

    writer
        .emit(&resolved)
        .context("writing interface profile")
}

/// Parse command-line arguments into CLI configuration.
pub(crate) fn parse_args(
    log: &Logger,
    argv: impl IntoIterator<Item = String>,
) -> Result<CliConfig> {
    let cfg = match CliConfig::try_parse_from(argv) {
        Err(e) if e.kind() == clap::error::ErrorKind::DisplayHelp => e.exit(),
        Err(e) if e.kind() == clap::error::ErrorKind::DisplayVersion => e.exit(),
        v => v,
    }?;
    trace!(log, "cli configuration"; "config" => ?cfg);
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{kind_of, ErrorKind};
    use crate::network::parse_link_address;
    use crate::profile::tests::IFCFG_TEMPLATE;
    use crate::retry;
    use crate::retry::tests::{discard, FakeClock};
    use std::fs;

    const VNICS_METADATA_ENDPOINT: &str = "/opc/v2/vnics/";

    /// Answers with canned `ip link show` output.
    struct CannedIpLink(&'static str);

    impl HardwareAddressResolver for CannedIpLink {
        fn resolve_hardware_address(&self, interface_name: &str) -> Result<String> {
            parse_link_address(self.0).context(ErrorKind::Resolution(interface_name.to_string()))
        }
    }

    const ENS5_LINK: &str = "3: ens5: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 9000 qdisc mq state UP mode DEFAULT group default qlen 1000
    link/ether aa:bb:cc:dd:ee:ff brd ff:ff:ff:ff:ff:ff
";

    struct Fixture {
        _dir: tempfile::TempDir,
        server: mockito::ServerGuard,
        writer: ProfileWriter,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let template_path = dir.path().join("profile.tpl");
            fs::write(&template_path, IFCFG_TEMPLATE).unwrap();
            let writer = ProfileWriter::new(dir.path(), template_path, discard());
            Fixture {
                _dir: dir,
                server: mockito::Server::new(),
                writer,
            }
        }

        fn serve(&mut self, body: &str) -> mockito::Mock {
            self.server
                .mock("GET", VNICS_METADATA_ENDPOINT)
                .match_header("Authorization", "Bearer Oracle")
                .with_status(200)
                .with_body(body)
                .create()
        }

        fn provider(&self) -> OracleCloudProvider {
            let client = retry::Client::try_new(discard())
                .unwrap()
                .mock_base_url(self.server.url());
            OracleCloudProvider::new_with_client(client, discard())
        }

        fn run(&self, resolver: &dyn HardwareAddressResolver) -> Result<EmitOutcome> {
            let provider = self.provider();
            let clock = FakeClock::new();
            let matcher = Matcher::with_clock(&provider, &clock, discard());
            configure_interface(&discard(), "ens5", resolver, &matcher, &self.writer)
        }
    }

    #[test]
    fn clap_tests() {
        use clap::CommandFactory;
        CliConfig::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let args = vec!["oci-vnic".to_string(), "ens5".to_string()];
        let cfg = parse_args(&discard(), args).unwrap();
        assert_eq!(cfg.interface, "ens5");
        assert_eq!(cfg.template, PathBuf::from("/etc/oci-vnic/profile.tpl"));
        assert_eq!(cfg.profile_dir, PathBuf::from("/etc/sysconfig/network-scripts"));
        assert_eq!(cfg.resolver, ResolverKind::Ip);
        assert_eq!(cfg.metadata_timeout, 30);
        assert_eq!(cfg.attachment_timeout, 30);
    }

    #[test]
    fn test_overrides() {
        let args: Vec<_> = [
            "oci-vnic",
            "--template",
            "/tmp/t.tpl",
            "--profile-dir",
            "/tmp/profiles",
            "--resolver",
            "native",
            "--attachment-timeout",
            "90",
            "ens6",
        ]
        .iter()
        .map(ToString::to_string)
        .collect();

        let cfg = parse_args(&discard(), args).unwrap();
        assert_eq!(cfg.interface, "ens6");
        assert_eq!(cfg.template, PathBuf::from("/tmp/t.tpl"));
        assert_eq!(cfg.profile_dir, PathBuf::from("/tmp/profiles"));
        assert_eq!(cfg.resolver, ResolverKind::Native);
        assert_eq!(cfg.metadata_timeout, 30);
        assert_eq!(cfg.attachment_timeout, 90);
    }

    #[test]
    fn test_wrong_arg_count() {
        let cases = vec![vec!["oci-vnic"], vec!["oci-vnic", "ens5", "ens6"]];
        for args in cases {
            let args: Vec<_> = args.iter().map(ToString::to_string).collect();
            parse_args(&discard(), args).unwrap_err();
        }
    }

    #[test]
    fn test_extra_argument_makes_no_request() {
        let mut fixture = Fixture::new();
        let mock = fixture
            .server
            .mock("GET", VNICS_METADATA_ENDPOINT)
            .expect(0)
            .create();
        let provider = fixture.provider();
        let profile_dir = fixture.writer.profile_path("ens5");
        let profile_dir = profile_dir.parent().unwrap().display().to_string();

        let args: Vec<_> = ["oci-vnic", "--profile-dir", profile_dir.as_str(), "ens5", "ens6"]
            .iter()
            .map(ToString::to_string)
            .collect();
        parse_args(&discard(), args)
            .and_then(|cfg| cfg.run_with_provider(&discard(), &provider))
            .unwrap_err();

        mock.assert();
        assert!(!fixture.writer.profile_path("ens5").exists());
        assert!(!fixture.writer.profile_path("ens6").exists());
    }

    #[test]
    fn test_configure_interface() {
        let mut fixture = Fixture::new();
        let mock = fixture.serve(
            r#"[{
    "macAddr": "AA:BB:CC:DD:EE:FF",
    "privateIp": "10.0.0.23",
    "subnetCidrBlock": "10.0.0.0/24",
    "virtualRouterIp": "10.0.0.1"
}]"#,
        );

        let outcome = fixture.run(&CannedIpLink(ENS5_LINK)).unwrap();
        mock.assert();

        let path = fixture.writer.profile_path("ens5");
        assert_eq!(outcome, EmitOutcome::Created(path.clone()));
        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("HWADDR=aa:bb:cc:dd:ee:ff\n"));
        assert!(content.contains("IPADDR=10.0.0.23\n"));
        assert!(content.contains("PREFIX=24\n"));
        assert!(content.contains("GATEWAY=10.0.0.1\n"));
    }

    #[test]
    fn test_vnic_never_attached() {
        let mut fixture = Fixture::new();
        let _m = fixture.serve(
            r#"[{
    "macAddr": "02:00:17:00:00:01",
    "privateIp": "10.0.0.2",
    "subnetCidrBlock": "10.0.0.0/24",
    "virtualRouterIp": "10.0.0.1"
}]"#,
        );

        let err = fixture.run(&CannedIpLink(ENS5_LINK)).unwrap_err();
        assert_eq!(
            kind_of(&err),
            Some(&ErrorKind::Match("aa:bb:cc:dd:ee:ff".to_string()))
        );
        assert!(!fixture.writer.profile_path("ens5").exists());
    }

    #[test]
    fn test_empty_ipv6() {
        let mut fixture = Fixture::new();
        let _m = fixture.serve(
            r#"[{
    "macAddr": "aa:bb:cc:dd:ee:ff",
    "privateIp": "10.0.0.23",
    "subnetCidrBlock": "10.0.0.0/24",
    "virtualRouterIp": "10.0.0.1",
    "ipv6Addresses": []
}]"#,
        );

        fixture.run(&CannedIpLink(ENS5_LINK)).unwrap();
        let content = fs::read_to_string(fixture.writer.profile_path("ens5")).unwrap();
        assert!(!content.contains("IPV6"));
    }

    #[test]
    fn test_already_configured() {
        let mut fixture = Fixture::new();
        let _m = fixture.serve(
            r#"[{
    "macAddr": "aa:bb:cc:dd:ee:ff",
    "privateIp": "10.0.0.23",
    "subnetCidrBlock": "10.0.0.0/24",
    "virtualRouterIp": "10.0.0.1"
}]"#,
        );
        let path = fixture.writer.profile_path("ens5");
        fs::write(&path, "DEVICE=ens5\n").unwrap();

        let outcome = fixture.run(&CannedIpLink(ENS5_LINK)).unwrap();
        assert_eq!(outcome, EmitOutcome::AlreadyExists(path.clone()));
        assert_eq!(fs::read_to_string(path).unwrap(), "DEVICE=ens5\n");
    }

    #[test]
    fn test_unresolvable_interface() {
        let mut fixture = Fixture::new();
        let mock = fixture
            .server
            .mock("GET", VNICS_METADATA_ENDPOINT)
            .expect(0)
            .create();

        let err = fixture
            .run(&CannedIpLink("    link/loopback 00:00:00:00:00:00 brd 00:00:00:00:00:00\n"))
            .unwrap_err();
        assert_eq!(
            kind_of(&err),
            Some(&ErrorKind::Resolution("ens5".to_string()))
        );
        mock.assert();
    }
}
