//! Link enumeration from `networkctl` and `ip -j addr` output.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::exec::{ExecResult, command_line};
use crate::error::ConnectorError;

/// A network link as reported by systemd-networkd.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Link {
    /// Kernel interface index.
    pub index: u32,
    /// Interface name.
    pub name: String,
    /// Operational state (`routable`, `carrier`, `off`, ...).
    pub operational_state: String,
    /// `.network` file applied to the link, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_file: Option<String>,
    /// Addresses in `address/prefix` form.
    pub addresses: Vec<String>,
}

const JSON_LIST: &[&str] = &["networkctl", "list", "--json=short"];
const TEXT_LIST: &[&str] = &["networkctl", "list", "--no-legend"];
const IP_ADDR: &[&str] = &["ip", "-j", "addr"];

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NetworkctlLink {
    index: u32,
    name: String,
    #[serde(default)]
    operational_state: String,
    #[serde(default)]
    network_file: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NetworkctlList {
    Wrapped {
        #[serde(rename = "Interfaces")]
        interfaces: Vec<NetworkctlLink>,
    },
    Bare(Vec<NetworkctlLink>),
}

#[derive(Deserialize)]
struct IpInterface {
    ifindex: u32,
    #[serde(default)]
    addr_info: Vec<IpAddrInfo>,
}

#[derive(Deserialize)]
struct IpAddrInfo {
    local: Option<String>,
    prefixlen: Option<u8>,
}

/// Enumerate links using `run` to execute each probe command (argv form).
///
/// `networkctl list --json=short` is tried first; if it fails or its output
/// does not parse, the plain text listing is used. Addresses are merged in
/// from `ip -j addr` on a best-effort basis.
///
/// # Errors
///
/// Returns an error only if neither listing can be obtained.
pub fn gather_links<F>(mut run: F) -> Result<Vec<Link>, ConnectorError>
where
    F: FnMut(&[&str]) -> Result<ExecResult, ConnectorError>,
{
    let json = run(JSON_LIST).and_then(|result| {
        let result = result.check(&argv_line(JSON_LIST))?;
        parse_networkctl_json(&result.stdout).map_err(|e| ConnectorError::InvalidOutput {
            command: argv_line(JSON_LIST),
            message: e.to_string(),
        })
    });

    let mut links = match json {
        Ok(links) => links,
        Err(e) if e.is_connection() => return Err(e),
        Err(e) => {
            tracing::debug!("JSON link listing unavailable, using text: {e}");
            let result = run(TEXT_LIST)?.check(&argv_line(TEXT_LIST))?;
            parse_networkctl_text(&result.stdout)
        }
    };

    match run(IP_ADDR) {
        Ok(result) if result.success => match parse_ip_addresses(&result.stdout) {
            Ok(addresses) => attach_addresses(&mut links, &addresses),
            Err(e) => tracing::debug!("ignoring unparsable ip -j addr output: {e}"),
        },
        Ok(result) => tracing::debug!("ip -j addr failed: {}", result.combined().trim()),
        Err(e) if e.is_connection() => return Err(e),
        Err(e) => tracing::debug!("ip -j addr unavailable: {e}"),
    }

    Ok(links)
}

/// Parse `networkctl list --json=short`, either a bare array or an
/// `{"Interfaces": [...]}` object.
///
/// # Errors
///
/// Returns the JSON error if the output has neither shape.
pub fn parse_networkctl_json(output: &str) -> Result<Vec<Link>, serde_json::Error> {
    let list: NetworkctlList = serde_json::from_str(output)?;
    let raw = match list {
        NetworkctlList::Wrapped { interfaces } => interfaces,
        NetworkctlList::Bare(links) => links,
    };
    Ok(raw
        .into_iter()
        .map(|l| Link {
            index: l.index,
            name: l.name,
            operational_state: l.operational_state,
            network_file: l.network_file.filter(|f| !f.is_empty()),
            addresses: Vec::new(),
        })
        .collect())
}

/// Parse `networkctl list --no-legend` text: `IDX LINK TYPE OPERATIONAL SETUP`.
///
/// Lines with fewer than five fields or a non-positive index are skipped.
#[must_use]
pub fn parse_networkctl_text(output: &str) -> Vec<Link> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [index, name, _kind, state, _setup, ..] = fields.as_slice() else {
                return None;
            };
            let index: u32 = index.parse().ok().filter(|i| *i > 0)?;
            Some(Link {
                index,
                name: (*name).to_string(),
                operational_state: (*state).to_string(),
                ..Link::default()
            })
        })
        .collect()
}

/// Parse `ip -j addr` into interface index to `address/prefix` list.
///
/// # Errors
///
/// Returns the JSON error if the output is not an interface array.
pub fn parse_ip_addresses(output: &str) -> Result<HashMap<u32, Vec<String>>, serde_json::Error> {
    let interfaces: Vec<IpInterface> = serde_json::from_str(output)?;
    Ok(interfaces
        .into_iter()
        .map(|iface| {
            let addresses = iface
                .addr_info
                .into_iter()
                .filter_map(|info| {
                    let local = info.local?;
                    Some(match info.prefixlen {
                        Some(prefix) => format!("{local}/{prefix}"),
                        None => local,
                    })
                })
                .collect();
            (iface.ifindex, addresses)
        })
        .collect())
}

fn attach_addresses(links: &mut [Link], addresses: &HashMap<u32, Vec<String>>) {
    for link in links {
        if let Some(found) = addresses.get(&link.index) {
            link.addresses.clone_from(found);
        }
    }
}

fn argv_line(argv: &[&str]) -> String {
    match argv.split_first() {
        Some((program, args)) => command_line(program, args),
        None => String::new(),
    }
}
