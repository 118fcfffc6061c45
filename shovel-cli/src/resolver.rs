//! Node resolver
//!
//! Resolves the node a user typed to a peer record by scanning the port
//! range. A target may be a port number, a full node name or an unambiguous
//! name prefix.

use anyhow::{Result, anyhow};
use shovel_core::domain::peer::PeerRecord;

/// Picks the node `target` refers to among `peers`
///
/// # Errors
/// Returns an error if no node matches, or a prefix matches several nodes.
pub fn resolve_node(peers: &[PeerRecord], target: &str) -> Result<PeerRecord> {
    if let Ok(port) = target.parse::<u16>() {
        return Ok(peers
            .iter()
            .find(|p| p.port == port)
            .cloned()
            .unwrap_or_else(|| PeerRecord::new(target, 0, port)));
    }

    if let Some(exact) = peers.iter().find(|p| p.name == target) {
        return Ok(exact.clone());
    }

    let prefix = target.to_lowercase();
    let matches: Vec<&PeerRecord> = peers
        .iter()
        .filter(|p| p.name.to_lowercase().starts_with(&prefix))
        .collect();

    match matches.as_slice() {
        [] => Err(anyhow!("No client named '{}' found", target)),
        [only] => Ok((*only).clone()),
        _ => {
            let names: Vec<&str> = matches.iter().map(|p| p.name.as_str()).collect();
            Err(anyhow!(
                "Ambiguous name '{}' matches multiple clients: {}",
                target,
                names.join(", ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peers() -> Vec<PeerRecord> {
        vec![
            PeerRecord::new("alpha", 0, 5001),
            PeerRecord::new("alpha-5003", 0, 5003),
            PeerRecord::new("beta", 1, 5002),
        ]
    }

    #[test]
    fn test_resolve_exact_name_beats_prefix() {
        assert_eq!(resolve_node(&peers(), "alpha").unwrap().port, 5001);
    }

    #[test]
    fn test_resolve_unique_prefix() {
        assert_eq!(resolve_node(&peers(), "BE").unwrap().name, "beta");
    }

    #[test]
    fn test_resolve_port_number() {
        assert_eq!(resolve_node(&peers(), "5003").unwrap().name, "alpha-5003");
        assert_eq!(resolve_node(&[], "5009").unwrap().port, 5009);
    }

    #[test]
    fn test_resolve_errors() {
        assert!(resolve_node(&peers(), "gamma").is_err());
        let err = resolve_node(&peers(), "al").unwrap_err();
        assert!(err.to_string().contains("Ambiguous"));
    }
}
