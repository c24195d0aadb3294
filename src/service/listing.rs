//! Per-file metadata shown when listing a configuration directory.
use serde::Serialize;

use crate::convert::{ConfigDocument, Entries, Value};
use crate::schema::ConfigKind;

/// One configuration file in a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    /// File name inside the configuration directory.
    pub filename: String,
    /// Kind derived from the extension.
    pub kind: ConfigKind,
    /// `[NetDev] Kind`, for netdev files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub netdev_kind: Option<String>,
    /// `[NetDev] Name`, for netdev files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub netdev_name: Option<String>,
    /// Interfaces named in `[Match]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_name: Option<String>,
    /// Key settings; absent when the file could not be read or parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ConfigSummary>,
}

impl FileInfo {
    /// Entry for a file whose content is unknown.
    #[must_use]
    pub const fn bare(filename: String, kind: ConfigKind) -> Self {
        Self {
            filename,
            kind,
            netdev_kind: None,
            netdev_name: None,
            match_name: None,
            summary: None,
        }
    }

    /// Fill in metadata from the parsed document.
    #[must_use]
    pub fn describe(mut self, document: &ConfigDocument) -> Self {
        let mut summary = ConfigSummary::default();
        match self.kind {
            ConfigKind::Network => {
                self.match_name = joined(document, "Match", "Name");
                if let Some(network) = first_block(document, "Network") {
                    summary.dhcp = network.get("DHCP").map(ToString::to_string);
                    summary.address = strings(network, "Address");
                    summary.dns = strings(network, "DNS");
                    summary.vlan = strings(network, "VLAN");
                }
            }
            ConfigKind::NetDev => {
                if let Some(netdev) = first_block(document, "NetDev") {
                    self.netdev_kind = netdev.get("Kind").map(ToString::to_string);
                    self.netdev_name = netdev.get("Name").map(ToString::to_string);
                }
                summary.vlan_id = first_block(document, "VLAN")
                    .and_then(|vlan| vlan.get("Id"))
                    .and_then(vlan_id);
            }
            ConfigKind::Link => {
                self.match_name = joined(document, "Match", "Name")
                    .or_else(|| joined(document, "Match", "MACAddress"));
            }
            ConfigKind::NetworkdConf => {}
        }
        self.summary = Some(summary);
        self
    }
}

/// Headline settings of one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigSummary {
    /// `[Network] DHCP`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dhcp: Option<String>,
    /// `[Network] Address` values.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub address: Vec<String>,
    /// `[Network] DNS` values.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dns: Vec<String>,
    /// `[Network] VLAN` values.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub vlan: Vec<String>,
    /// `[VLAN] Id` of a VLAN netdev.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vlan_id: Option<i64>,
}

/// Filter applied to `[Match]` sections when listing.
///
/// Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchCriteria {
    /// Interface name, compared exactly.
    pub name: Option<String>,
    /// Hardware address, compared case-insensitively.
    pub mac: Option<String>,
    /// Link type, compared case-insensitively.
    pub kind: Option<String>,
}

impl MatchCriteria {
    /// Whether no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.mac.is_none() && self.kind.is_none()
    }

    /// Whether the document's `[Match]` section satisfies every set field.
    #[must_use]
    pub fn matches(&self, document: &ConfigDocument) -> bool {
        let words = |key: &str| -> Vec<String> {
            document
                .get("Match")
                .into_iter()
                .flat_map(|section| section.blocks())
                .filter_map(|block| block.get(key))
                .flat_map(Value::to_strings)
                .flat_map(|s| s.split_whitespace().map(String::from).collect::<Vec<_>>())
                .collect()
        };

        let name_ok = self
            .name
            .as_ref()
            .is_none_or(|want| words("Name").iter().any(|n| n == want));
        let mac_ok = self
            .mac
            .as_ref()
            .is_none_or(|want| words("MACAddress").iter().any(|m| m.eq_ignore_ascii_case(want)));
        let kind_ok = self
            .kind
            .as_ref()
            .is_none_or(|want| words("Type").iter().any(|t| t.eq_ignore_ascii_case(want)));
        name_ok && mac_ok && kind_ok
    }
}

fn first_block<'a>(document: &'a ConfigDocument, section: &str) -> Option<&'a Entries> {
    document.get(section).and_then(|s| s.first())
}

fn strings(block: &Entries, key: &str) -> Vec<String> {
    block.get(key).map(Value::to_strings).unwrap_or_default()
}

fn joined(document: &ConfigDocument, section: &str, key: &str) -> Option<String> {
    let values = first_block(document, section).map(|b| strings(b, key))?;
    (!values.is_empty()).then(|| values.join(", "))
}

fn vlan_id(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::convert::Section;

    fn block(pairs: &[(&str, Value)]) -> Entries {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn document(sections: &[(&str, Entries)]) -> ConfigDocument {
        sections
            .iter()
            .map(|(name, entries)| ((*name).to_string(), Section::Single(entries.clone())))
            .collect()
    }

    #[test]
    fn network_summary() {
        let doc = document(&[
            ("Match", block(&[("Name", Value::from("eth0"))])),
            (
                "Network",
                block(&[
                    ("DHCP", Value::from("ipv4")),
                    ("DNS", Value::from(vec!["1.1.1.1", "9.9.9.9"])),
                    ("VLAN", Value::from(vec!["vlan10"])),
                ]),
            ),
        ]);
        let info = FileInfo::bare("10-eth0.network".to_string(), ConfigKind::Network).describe(&doc);
        assert_eq!(info.match_name.as_deref(), Some("eth0"));
        let summary = info.summary.unwrap();
        assert_eq!(summary.dhcp.as_deref(), Some("ipv4"));
        assert_eq!(summary.dns, ["1.1.1.1", "9.9.9.9"]);
        assert_eq!(summary.vlan, ["vlan10"]);
        assert!(summary.address.is_empty());
    }

    #[test]
    fn netdev_summary_reads_vlan_id() {
        let doc = document(&[
            (
                "NetDev",
                block(&[("Name", Value::from("vlan10")), ("Kind", Value::from("vlan"))]),
            ),
            ("VLAN", block(&[("Id", Value::Integer(10))])),
        ]);
        let info = FileInfo::bare("20-vlan10.netdev".to_string(), ConfigKind::NetDev).describe(&doc);
        assert_eq!(info.netdev_kind.as_deref(), Some("vlan"));
        assert_eq!(info.netdev_name.as_deref(), Some("vlan10"));
        assert_eq!(info.summary.unwrap().vlan_id, Some(10));
    }

    #[test]
    fn link_match_falls_back_to_mac() {
        let doc = document(&[(
            "Match",
            block(&[("MACAddress", Value::from("00:11:22:33:44:55"))]),
        )]);
        let info = FileInfo::bare("10-wan.link".to_string(), ConfigKind::Link).describe(&doc);
        assert_eq!(info.match_name.as_deref(), Some("00:11:22:33:44:55"));
    }

    #[test]
    fn criteria_compare_names_exactly_and_macs_loosely() {
        let doc = document(&[(
            "Match",
            block(&[
                ("Name", Value::from("eth0 eth1")),
                ("MACAddress", Value::from("AA:BB:CC:DD:EE:FF")),
                ("Type", Value::from("ether")),
            ]),
        )]);
        let by_name = |name: &str| MatchCriteria {
            name: Some(name.to_string()),
            ..MatchCriteria::default()
        };
        assert!(by_name("eth1").matches(&doc));
        assert!(!by_name("ETH1").matches(&doc));
        assert!(
            MatchCriteria {
                mac: Some("aa:bb:cc:dd:ee:ff".to_string()),
                kind: Some("Ether".to_string()),
                ..MatchCriteria::default()
            }
            .matches(&doc)
        );
        assert!(
            !MatchCriteria {
                kind: Some("wlan".to_string()),
                ..MatchCriteria::default()
            }
            .matches(&doc)
        );
        assert!(MatchCriteria::default().matches(&ConfigDocument::new()));
    }

    #[test]
    fn summary_serializes_sparsely() {
        let info = FileInfo {
            summary: Some(ConfigSummary {
                dhcp: Some("yes".to_string()),
                ..ConfigSummary::default()
            }),
            ..FileInfo::bare("10-eth0.network".to_string(), ConfigKind::Network)
        };
        insta::assert_snapshot!(
            serde_json::to_string(&info).unwrap(),
            @r#"{"filename":"10-eth0.network","kind":"network","summary":{"dhcp":"yes"}}"#
        );
    }
}
