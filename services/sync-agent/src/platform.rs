//! Vendor platforms and their access profiles.
//!
//! A [`VendorProfile`] carries everything that differs between vendors:
//! how to reach the device, how to set up the session, which commands list
//! VLANs, what the prompt looks like, and how VLAN names are derived.

use std::sync::LazyLock;

use netsync_id::VlanId;
use netsync_reconcile::VlanNaming;
use regex::Regex;

static CISCO_PROMPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.\-@/:]+(\([\w.\-/]+\))?[>#]\s*$").expect("valid prompt regex"));

static VRP_PROMPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(<[\w.\-@/:]+>|\[[~*]?[\w.\-@/:]+\])\s*$").expect("valid prompt regex"));

/// Device platform, as named by the inventory's `platform` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Cisco IOS over SSH.
    Ios,
    /// Cisco IOS over Telnet.
    IosTelnet,
    /// Cisco NX-OS over SSH.
    Nxos,
    /// Huawei VRP over SSH.
    Vrp,
}

impl Platform {
    /// Match an inventory platform name (case-insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ios" => Some(Self::Ios),
            "ios_telnet" => Some(Self::IosTelnet),
            "nxos" => Some(Self::Nxos),
            "vrp" => Some(Self::Vrp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::IosTelnet => "ios_telnet",
            Self::Nxos => "nxos",
            Self::Vrp => "vrp",
        }
    }

    /// The access profile for this platform.
    pub fn profile(&self) -> VendorProfile {
        let (access, dialect) = match self {
            Self::Ios | Self::Nxos => (Access::Ssh, Dialect::Cisco),
            Self::IosTelnet => (Access::Telnet, Dialect::Cisco),
            Self::Vrp => (Access::Ssh, Dialect::Vrp),
        };
        VendorProfile {
            platform: *self,
            access,
            dialect,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a device is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Ssh,
    Telnet,
}

impl Access {
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Ssh => 22,
            Self::Telnet => 23,
        }
    }
}

/// Command language family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Cisco,
    Vrp,
}

/// Per-platform access profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VendorProfile {
    pub platform: Platform,
    pub access: Access,
    pub dialect: Dialect,
}

impl VendorProfile {
    pub fn port(&self) -> u16 {
        self.access.default_port()
    }

    /// Commands run once after login.
    pub fn setup_commands(&self) -> &'static [&'static str] {
        match self.dialect {
            Dialect::Cisco => &["terminal length 0"],
            Dialect::Vrp => &["screen-length 0 temporary"],
        }
    }

    /// Command listing the VLAN table.
    pub fn list_command(&self) -> &'static str {
        match self.platform {
            Platform::Ios | Platform::IosTelnet => "show vlan",
            Platform::Nxos => "show vlan brief",
            Platform::Vrp => "display vlan",
        }
    }

    /// Command with per-VLAN detail, when the list lacks names.
    pub fn detail_command(&self, vid: VlanId) -> Option<String> {
        match self.dialect {
            Dialect::Cisco => None,
            Dialect::Vrp => Some(format!("display vlan {vid} verbose")),
        }
    }

    /// Command showing one VLAN, used to check it is absent.
    pub fn lookup_command(&self, vid: VlanId) -> String {
        match self.dialect {
            Dialect::Cisco => format!("show vlan id {vid}"),
            Dialect::Vrp => format!("display vlan {vid}"),
        }
    }

    /// CLI prompt pattern, matched against the last output line.
    pub fn prompt(&self) -> &'static Regex {
        match self.dialect {
            Dialect::Cisco => &CISCO_PROMPT,
            Dialect::Vrp => &VRP_PROMPT,
        }
    }

    /// Command that ends the CLI session.
    pub fn exit_command(&self) -> &'static str {
        match self.dialect {
            Dialect::Cisco => "exit",
            Dialect::Vrp => "quit",
        }
    }

    pub fn naming(&self) -> VlanNaming {
        match self.dialect {
            Dialect::Cisco => VlanNaming::Verbatim,
            Dialect::Vrp => VlanNaming::SuffixIdentity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("ios", Platform::Ios)]
    #[case("IOS_TELNET", Platform::IosTelnet)]
    #[case("nxos", Platform::Nxos)]
    #[case("VRP", Platform::Vrp)]
    fn test_platform_parse(#[case] name: &str, #[case] expected: Platform) {
        assert_eq!(Platform::parse(name), Some(expected));
    }

    #[test]
    fn test_unknown_platform() {
        assert_eq!(Platform::parse("junos"), None);
    }

    #[test]
    fn test_profiles() {
        let telnet = Platform::IosTelnet.profile();
        assert_eq!(telnet.port(), 23);
        assert_eq!(telnet.list_command(), "show vlan");

        let nxos = Platform::Nxos.profile();
        assert_eq!(nxos.port(), 22);
        assert_eq!(nxos.list_command(), "show vlan brief");

        let vrp = Platform::Vrp.profile();
        let vid = VlanId::new(10).unwrap();
        assert_eq!(vrp.detail_command(vid).as_deref(), Some("display vlan 10 verbose"));
        assert_eq!(vrp.naming(), VlanNaming::SuffixIdentity);
    }

    #[rstest]
    #[case(Platform::Ios, "sw-core-1#", true)]
    #[case(Platform::Ios, "sw-core-1>", true)]
    #[case(Platform::Ios, "sw-core-1(config-if)#", true)]
    #[case(Platform::Ios, "100  Guest   active", false)]
    #[case(Platform::Vrp, "<HUAWEI-AGG1>", true)]
    #[case(Platform::Vrp, "[~HUAWEI-AGG1]", true)]
    #[case(Platform::Vrp, "[HUAWEI-AGG1-GigabitEthernet0/0/1]", true)]
    #[case(Platform::Vrp, "VID  Status", false)]
    fn test_prompts(#[case] platform: Platform, #[case] line: &str, #[case] matches: bool) {
        assert_eq!(platform.profile().prompt().is_match(line), matches);
    }
}
