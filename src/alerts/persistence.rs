//! Atomic persistence of active alert episodes, so a restart recovers
//! in-flight episodes rather than re-triggering or silently losing them
//! across restarts. Only `Active`/`Acknowledged` episodes are persisted; `Pending`
//! episodes are allowed to be lost on restart since they have not yet
//! produced a user-visible event.

use std::io::Write;
use std::path::Path;

use super::state::{Episode, Phase};

pub fn save(path: &Path, episodes: &[Episode]) -> std::io::Result<()> {
    let persisted: Vec<&Episode> = episodes
        .iter()
        .filter(|e| matches!(e.phase, Phase::Active | Phase::Acknowledged))
        .collect();
    let json = serde_json::to_vec_pretty(&persisted)?;

    let tmp_path = path.with_extension("json.tmp");
    {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

pub fn load(path: &Path) -> std::io::Result<Vec<Episode>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read(path)?;
    serde_json::from_slice(&content)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::state::AlertId;
    use crate::identity::Fingerprint;

    fn episode(phase: Phase) -> Episode {
        Episode {
            id: AlertId("fp:cpu_pct:1".into()),
            fingerprint: Fingerprint::for_pve_node("c", "n"),
            rule_name: "cpu-high".into(),
            metric: "cpu_pct".into(),
            phase,
            threshold: 80.0,
            since: chrono::Utc::now(),
            first_exceed_at: chrono::Utc::now(),
            last_value: 90.0,
            acknowledged_at: None,
        }
    }

    #[test]
    fn round_trips_active_episodes_and_drops_pending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.json");
        let episodes = vec![episode(Phase::Active), episode(Phase::Pending)];
        save(&path, &episodes).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].phase, Phase::Active);
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(load(&path).unwrap().is_empty());
    }
}
