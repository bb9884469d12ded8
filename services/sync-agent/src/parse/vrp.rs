//! Huawei VRP `display vlan`, `display vlan <id>` and
//! `display vlan <id> verbose`.

use std::sync::LazyLock;

use netsync_id::VlanId;
use regex::Regex;

use super::{ParseError, ParsedVlan};

const LIST_COMMAND: &str = "display vlan";
const VERBOSE_COMMAND: &str = "display vlan verbose";

static STATUS_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*VID\s+Status\b").expect("valid header regex"));

static STATUS_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(\d{1,4})\s+(enable|disable)\s+\S+\s+\S+\s+\S+\s*(.*)$")
        .expect("valid status row regex")
});

static PORTS_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*VID\s+Type\s+Ports\b").expect("valid header regex"));

static PORTS_ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d{1,4})\s+\S+\s*(.*)$").expect("valid ports row regex"));

static KEY_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z][A-Za-z \-]*?)\s*:\s?(.*)$").expect("valid key regex"));

fn vlan_id(raw: &str, command: &'static str, line: &str) -> Result<VlanId, ParseError> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .and_then(|v| VlanId::new(v).ok())
        .ok_or_else(|| ParseError::UnrecognizedOutput {
            command,
            line: line.to_string(),
        })
}

/// Parse the status table of `display vlan`.
///
/// VRP leaves names out of this table, so `name` is empty and the
/// description column is kept. Names come from the verbose output.
pub fn parse_vrp_vlans(output: &str) -> Result<Vec<ParsedVlan>, ParseError> {
    if output.trim().is_empty() {
        return Err(ParseError::EmptyOutput(LIST_COMMAND));
    }

    let mut vlans = Vec::new();
    let mut in_table = false;

    for line in output.lines() {
        if STATUS_HEADER.is_match(line) {
            in_table = true;
            continue;
        }
        if !in_table {
            continue;
        }
        if let Some(caps) = STATUS_ROW.captures(line) {
            vlans.push(ParsedVlan {
                vid: vlan_id(&caps[1], LIST_COMMAND, line)?,
                name: String::new(),
                description: caps[3].trim().to_string(),
                status: caps[2].to_ascii_lowercase(),
                ports: Vec::new(),
            });
        }
    }

    if !in_table {
        return Err(ParseError::UnrecognizedOutput {
            command: LIST_COMMAND,
            line: output.lines().find(|l| !l.trim().is_empty()).unwrap_or_default().to_string(),
        });
    }
    Ok(vlans)
}

/// Tagged ports per VLAN from the port table of `display vlan [<id>]`.
///
/// Port cells look like `TG:Eth-Trunk1(U)`. A `TG:` or `UT:` prefix holds
/// until the next prefix, and rows may wrap onto indented lines. Untagged
/// ports are left out.
pub fn parse_vrp_tagged_ports(output: &str) -> Result<Vec<(VlanId, Vec<String>)>, ParseError> {
    if output.trim().is_empty() {
        return Err(ParseError::EmptyOutput(LIST_COMMAND));
    }

    let mut rows: Vec<(VlanId, Vec<String>)> = Vec::new();
    let mut in_table = false;
    let mut tagged = false;

    for line in output.lines() {
        if PORTS_HEADER.is_match(line) {
            in_table = true;
            continue;
        }
        if !in_table || line.trim_start().starts_with("----") {
            continue;
        }
        if line.trim().is_empty() || STATUS_HEADER.is_match(line) {
            if !rows.is_empty() {
                break;
            }
            continue;
        }

        let cells = match PORTS_ROW.captures(line) {
            Some(caps) => {
                rows.push((vlan_id(&caps[1], LIST_COMMAND, line)?, Vec::new()));
                tagged = false;
                caps.get(2).map_or("", |m| m.as_str())
            }
            None if line.starts_with(char::is_whitespace) => line,
            None => continue,
        };
        let Some((_, ports)) = rows.last_mut() else {
            continue;
        };
        for cell in cells.split_whitespace() {
            let port = if let Some(port) = cell.strip_prefix("TG:") {
                tagged = true;
                port
            } else if let Some(port) = cell.strip_prefix("UT:") {
                tagged = false;
                port
            } else {
                cell
            };
            let port = port.split('(').next().unwrap_or_default();
            if tagged && !port.is_empty() {
                ports.push(port.to_string());
            }
        }
    }

    if !in_table {
        return Err(ParseError::UnrecognizedOutput {
            command: LIST_COMMAND,
            line: output.lines().find(|l| !l.trim().is_empty()).unwrap_or_default().to_string(),
        });
    }
    Ok(rows)
}

/// Fields of `display vlan <id> verbose`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VrpVlanDetail {
    pub vid: VlanId,
    pub name: String,
    pub description: String,
    pub status: String,
}

/// Parse the key/value block of `display vlan <id> verbose`.
pub fn parse_vrp_verbose(output: &str) -> Result<VrpVlanDetail, ParseError> {
    if output.trim().is_empty() {
        return Err(ParseError::EmptyOutput(VERBOSE_COMMAND));
    }

    let mut vid = None;
    let mut name = String::new();
    let mut description = String::new();
    let mut status = String::new();

    for line in output.lines() {
        let Some(caps) = KEY_VALUE.captures(line) else {
            continue;
        };
        let value = caps[2].trim();
        match caps[1].to_ascii_lowercase().as_str() {
            "vlan id" => vid = Some(vlan_id(value, VERBOSE_COMMAND, line)?),
            "vlan name" => name = value.to_string(),
            "description" => description = value.to_string(),
            "status" => status = value.to_ascii_lowercase(),
            _ => {}
        }
    }

    let vid = vid.ok_or_else(|| ParseError::UnrecognizedOutput {
        command: VERBOSE_COMMAND,
        line: output.lines().find(|l| !l.trim().is_empty()).unwrap_or_default().to_string(),
    })?;

    Ok(VrpVlanDetail {
        vid,
        name,
        description,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISPLAY_VLAN: &str = "\
The total number of vlans is : 3
--------------------------------------------------------------------------------
U: Up;         D: Down;         TG: Tagged;         UT: Untagged;
MP: Vlan-mapping;               ST: Vlan-stacking;
#: ProtocolTransparent-vlan;    *: Management-vlan;
--------------------------------------------------------------------------------

VID  Type    Ports
--------------------------------------------------------------------------------
1    common  UT:GE0/0/1(U)      GE0/0/2(D)
10   common  TG:GE0/0/1(U)
20   common  TG:GE0/0/1(U)

VID  Status  Property      MAC-LRN Statistics Description
--------------------------------------------------------------------------------
1    enable  default       enable  disable    VLAN 0001
10   enable  default       enable  disable    servers
20   disable default       enable  disable
";

    const VERBOSE: &str = "\
    VLAN ID        : 10
    VLAN Name      : srv
    VLAN Type      : Common
    Description    : servers
    Status         : Enable
    Broadcast      : Enable
    MAC Learning   : Enable
    Smart MAC Learning : Disable
    Current MAC Learning Result : Enable
    Statistics     : Disable
    Property       : Default
    VLAN State     : Up
";

    #[test]
    fn test_parse_status_table() {
        let vlans = parse_vrp_vlans(DISPLAY_VLAN).unwrap();
        assert_eq!(vlans.len(), 3);
        assert_eq!(vlans[1].vid.value(), 10);
        assert_eq!(vlans[1].description, "servers");
        assert!(vlans[1].is_active());
        assert_eq!(vlans[2].description, "");
        assert!(!vlans[2].is_active());
    }

    #[test]
    fn test_parse_tagged_ports() {
        let rows = parse_vrp_tagged_ports(DISPLAY_VLAN).unwrap();
        let ports: Vec<(u16, Vec<String>)> = rows.into_iter().map(|(v, p)| (v.value(), p)).collect();
        assert_eq!(
            ports,
            vec![
                (1, vec![]),
                (10, vec!["GE0/0/1".to_string()]),
                (20, vec!["GE0/0/1".to_string()]),
            ]
        );
    }

    #[test]
    fn test_tagged_ports_wrap_and_mix() {
        let output = "\
VID  Type    Ports
--------------------------------------------------------------------------------
600  common  UT:GE0/0/3(D)      TG:Eth-Trunk1(U)   XGE0/0/1(U)
             XGE0/0/2(D)        UT:GE0/0/4(U)

VID  Status  Property      MAC-LRN Statistics Description
600  enable  default       enable  disable    VLAN 0600
";
        let rows = parse_vrp_tagged_ports(output).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, vec!["Eth-Trunk1", "XGE0/0/1", "XGE0/0/2"]);
    }

    #[test]
    fn test_parse_verbose() {
        let detail = parse_vrp_verbose(VERBOSE).unwrap();
        assert_eq!(detail.vid.value(), 10);
        assert_eq!(detail.name, "srv");
        assert_eq!(detail.description, "servers");
        assert_eq!(detail.status, "enable");
    }

    #[test]
    fn test_verbose_with_blank_name() {
        let detail = parse_vrp_verbose("VLAN ID : 50\nVLAN Name :\nDescription : uplink\n").unwrap();
        assert_eq!(detail.name, "");
        assert_eq!(detail.description, "uplink");
    }

    #[test]
    fn test_verbose_without_id() {
        let err = parse_vrp_verbose("Error: The VLAN does not exist.").unwrap_err();
        assert!(matches!(err, ParseError::UnrecognizedOutput { .. }));
    }

    #[test]
    fn test_empty_list() {
        assert_eq!(
            parse_vrp_vlans("").unwrap_err(),
            ParseError::EmptyOutput(LIST_COMMAND)
        );
    }
}
