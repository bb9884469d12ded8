//! Name derivation for observed entities.

use netsync_id::{IdError, VlanId, VmName};

use crate::error::DataQualityWarning;
use crate::record::Identity;

/// How a vendor's non-placeholder VLAN names are turned into inventory names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VlanNaming {
    /// Keep the device name as is.
    #[default]
    Verbatim,

    /// Append the VLAN id unless the name equals the description.
    SuffixIdentity,
}

/// A derived VLAN name and the warning raised while deriving it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedName {
    pub name: String,
    pub warning: Option<DataQualityWarning>,
}

/// Device default names that carry no information.
pub fn is_placeholder_name(name: &str) -> bool {
    let name = name.trim();
    name.is_empty() || name.eq_ignore_ascii_case("VLAN")
}

/// Derive the inventory name of a VLAN from what the device reports.
///
/// Never returns an empty name.
pub fn derive_vlan_name(
    vid: VlanId,
    name: &str,
    description: &str,
    naming: VlanNaming,
) -> DerivedName {
    let name = name.trim();
    let description = description.trim();

    if is_placeholder_name(name) {
        if !description.is_empty() {
            return DerivedName {
                name: format!("{description} {vid}"),
                warning: None,
            };
        }
        let fallback = format!("VLAN {vid}");
        return DerivedName {
            warning: Some(DataQualityWarning::AmbiguousName {
                identity: Identity::Vlan(vid),
                fallback: fallback.clone(),
            }),
            name: fallback,
        };
    }

    let name = match naming {
        VlanNaming::Verbatim => name.to_string(),
        VlanNaming::SuffixIdentity if name == description => name.to_string(),
        VlanNaming::SuffixIdentity => format!("{name} {vid}"),
    };
    DerivedName {
        name,
        warning: None,
    }
}

/// Derive a VM identity, truncating the raw name to `limit` characters.
///
/// Returns the identity and whether truncation happened.
pub fn vm_identity(raw: &str, limit: usize) -> Result<(Identity, bool), IdError> {
    let (name, truncated) = VmName::truncated(raw, limit)?;
    Ok((Identity::Name(name.into_inner()), truncated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn vid(v: u32) -> VlanId {
        VlanId::new(v).unwrap()
    }

    #[test]
    fn test_blank_name_uses_description() {
        let derived = derive_vlan_name(vid(50), "", "uplink", VlanNaming::Verbatim);
        assert_eq!(derived.name, "uplink 50");
        assert!(derived.warning.is_none());
    }

    #[rstest]
    #[case("VLAN")]
    #[case("vlan")]
    #[case("   ")]
    fn test_placeholders(#[case] name: &str) {
        assert!(is_placeholder_name(name));
        let derived = derive_vlan_name(vid(7), name, "printers", VlanNaming::SuffixIdentity);
        assert_eq!(derived.name, "printers 7");
    }

    #[test]
    fn test_blank_name_and_description_is_ambiguous() {
        let derived = derive_vlan_name(vid(12), "VLAN", "", VlanNaming::Verbatim);
        assert_eq!(derived.name, "VLAN 12");
        assert!(matches!(
            derived.warning,
            Some(DataQualityWarning::AmbiguousName { .. })
        ));
    }

    #[rstest]
    #[case(VlanNaming::Verbatim, "Guest", "", "Guest")]
    #[case(VlanNaming::SuffixIdentity, "Guest", "", "Guest 100")]
    #[case(VlanNaming::SuffixIdentity, "Guest", "Guest", "Guest")]
    #[case(VlanNaming::Verbatim, " VLAN0100 ", "", "VLAN0100")]
    fn test_named_vlans(
        #[case] naming: VlanNaming,
        #[case] name: &str,
        #[case] description: &str,
        #[case] expected: &str,
    ) {
        let derived = derive_vlan_name(vid(100), name, description, naming);
        assert_eq!(derived.name, expected);
    }

    #[test]
    fn test_vm_identity_truncates() {
        let raw = "a".repeat(70);
        let (identity, truncated) = vm_identity(&raw, 64).unwrap();
        assert_eq!(identity, Identity::Name("a".repeat(64)));
        assert!(truncated);

        let (identity, truncated) = vm_identity("web-01", 64).unwrap();
        assert_eq!(identity, Identity::Name("web-01".into()));
        assert!(!truncated);
    }
}
