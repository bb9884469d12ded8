//! Cisco IOS `show vlan` and NX-OS `show vlan brief`.
//!
//! Only the first table (`VLAN Name Status Ports`) is read. Port lists
//! wrapped onto continuation lines are appended to the previous row.

use std::sync::LazyLock;

use netsync_id::VlanId;
use regex::Regex;

use super::{ParseError, ParsedVlan};

const COMMAND: &str = "show vlan";

static ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,4})\s+(.*?)\s+(active|suspended|sus|act/\S+|sus/\S+)(?:\s+(.*))?$")
        .expect("valid vlan row regex")
});

static HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^VLAN\s+\S+").expect("valid header regex"));

fn split_ports(ports: &str) -> impl Iterator<Item = String> + '_ {
    ports
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
}

/// Parse the VLAN table.
pub fn parse_cisco_vlans(output: &str) -> Result<Vec<ParsedVlan>, ParseError> {
    if output.trim().is_empty() {
        return Err(ParseError::EmptyOutput(COMMAND));
    }

    let mut vlans: Vec<ParsedVlan> = Vec::new();
    let mut in_table = false;

    for line in output.lines() {
        let line = line.trim_end();
        if HEADER.is_match(line) {
            if in_table {
                break;
            }
            in_table = true;
            continue;
        }
        if !in_table || line.trim().is_empty() || line.starts_with("----") {
            continue;
        }

        if let Some(caps) = ROW.captures(line) {
            let vid = caps[1]
                .parse::<u32>()
                .ok()
                .and_then(|v| VlanId::new(v).ok())
                .ok_or_else(|| ParseError::UnrecognizedOutput {
                    command: COMMAND,
                    line: line.to_string(),
                })?;
            vlans.push(ParsedVlan {
                vid,
                name: caps[2].trim().to_string(),
                description: String::new(),
                status: caps[3].to_string(),
                ports: caps.get(4).map(|m| split_ports(m.as_str()).collect()).unwrap_or_default(),
            });
        } else if line.starts_with(char::is_whitespace) {
            if let Some(last) = vlans.last_mut() {
                last.ports.extend(split_ports(line));
            }
        }
    }

    if !in_table {
        return Err(ParseError::UnrecognizedOutput {
            command: COMMAND,
            line: output.lines().next().unwrap_or_default().to_string(),
        });
    }
    Ok(vlans)
}

#[cfg(test)]
mod tests {
    use super::*;

    const IOS_OUTPUT: &str = "\
VLAN Name                             Status    Ports
---- -------------------------------- --------- -------------------------------
1    default                          active    Gi0/1, Gi0/2, Gi0/3
                                                Gi0/4
10   Guest                            active
50   VLAN0050                         suspended Gi0/5
100  users floor 2                    active    Gi0/6
1002 fddi-default                     act/unsup

VLAN Type  SAID       MTU   Parent RingNo BridgeNo Stp  BrdgMode Trans1 Trans2
---- ----- ---------- ----- ------ ------ -------- ---- -------- ------ ------
1    enet  100001     1500  -      -      -        -    -        0      0
";

    const NXOS_OUTPUT: &str = "\

VLAN Name                             Status    Ports
---- -------------------------------- --------- -------------------------------
1    default                          active    Eth1/1, Eth1/2
200  storage                          active    Po10
";

    #[test]
    fn test_parse_ios_first_table_only() {
        let vlans = parse_cisco_vlans(IOS_OUTPUT).unwrap();
        let vids: Vec<u16> = vlans.iter().map(|v| v.vid.value()).collect();
        assert_eq!(vids, vec![1, 10, 50, 100, 1002]);

        assert_eq!(vlans[0].ports, vec!["Gi0/1", "Gi0/2", "Gi0/3", "Gi0/4"]);
        assert!(vlans[1].ports.is_empty());
        assert_eq!(vlans[2].status, "suspended");
        assert!(!vlans[2].is_active());
        assert_eq!(vlans[3].name, "users floor 2");
        assert!(!vlans[4].is_active());
    }

    #[test]
    fn test_parse_nxos_brief() {
        let vlans = parse_cisco_vlans(NXOS_OUTPUT).unwrap();
        assert_eq!(vlans.len(), 2);
        assert_eq!(vlans[1].name, "storage");
        assert_eq!(vlans[1].ports, vec!["Po10"]);
    }

    #[test]
    fn test_empty_output() {
        assert_eq!(
            parse_cisco_vlans("  \n").unwrap_err(),
            ParseError::EmptyOutput(COMMAND)
        );
    }

    #[test]
    fn test_output_without_table() {
        let err = parse_cisco_vlans("% Invalid input detected at '^' marker.").unwrap_err();
        assert!(matches!(err, ParseError::UnrecognizedOutput { .. }));
    }
}
