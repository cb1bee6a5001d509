//! Versioned artifact bundle for a trained [`SequenceForecaster`].
//!
//! Layout: `{dir}/model.json` (network weights) and `{dir}/scalers.json`
//! (feature and target scalers). Both files carry the same
//! [`ArtifactHeader`]; a pair whose headers disagree is rejected on load.

use crate::domain::BundleId;
use crate::error::{PipelineError, Result};
use crate::forecast::forecaster::SequenceForecaster;
use crate::forecast::lstm::LstmNetwork;
use crate::forecast::scaler::MinMaxScaler;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Current bundle schema version. Newer versions are refused.
pub const ARTIFACT_SCHEMA_VERSION: u32 = 1;

pub const MODEL_FILE: &str = "model.json";
pub const SCALERS_FILE: &str = "scalers.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactHeader {
    pub schema_version: u32,
    pub bundle_id: BundleId,
    pub feature_columns: Vec<String>,
    pub lookback: usize,
    pub created_at: DateTime<Utc>,
}

impl ArtifactHeader {
    pub fn new(
        bundle_id: BundleId,
        feature_columns: Vec<String>,
        lookback: usize,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            schema_version: ARTIFACT_SCHEMA_VERSION,
            bundle_id,
            feature_columns,
            lookback,
            created_at,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ModelArtifact {
    header: ArtifactHeader,
    network: LstmNetwork,
}

#[derive(Serialize, Deserialize)]
struct ScalerArtifact {
    header: ArtifactHeader,
    features: MinMaxScaler,
    target: MinMaxScaler,
}

/// BLAKE3 fingerprint over feature columns, lookback and both scalers.
pub fn bundle_id(
    columns: &[String],
    lookback: usize,
    features: &MinMaxScaler,
    target: &MinMaxScaler,
) -> Result<BundleId> {
    let canonical = serde_json::to_vec(&(columns, lookback, features, target))?;
    Ok(BundleId::from_bytes(&canonical))
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn read_artifact<T: DeserializeOwned>(path: PathBuf) -> Result<T> {
    if !path.exists() {
        return Err(PipelineError::ModelNotTrained { path });
    }
    let content = fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&content)?)
}

fn mismatch(expected: impl ToString, found: impl ToString) -> PipelineError {
    PipelineError::ArtifactMismatch {
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

/// Write both artifacts of a trained forecaster into `dir`.
pub fn save_bundle(dir: &Path, forecaster: &SequenceForecaster) -> Result<()> {
    fs::create_dir_all(dir)?;
    let scalers = ScalerArtifact {
        header: forecaster.header.clone(),
        features: forecaster.feature_scaler.clone(),
        target: forecaster.target_scaler.clone(),
    };
    let model = ModelArtifact {
        header: forecaster.header.clone(),
        network: forecaster.network.clone(),
    };
    write_atomic(&dir.join(SCALERS_FILE), &serde_json::to_string(&scalers)?)?;
    write_atomic(&dir.join(MODEL_FILE), &serde_json::to_string(&model)?)?;
    tracing::info!(
        dir = %dir.display(),
        bundle = %forecaster.header.bundle_id.short(),
        "artifact bundle saved"
    );
    Ok(())
}

/// Load and cross-check both artifacts from `dir`.
pub fn load_bundle(dir: &Path) -> Result<SequenceForecaster> {
    let model: ModelArtifact = read_artifact(dir.join(MODEL_FILE))?;
    let scalers: ScalerArtifact = read_artifact(dir.join(SCALERS_FILE))?;

    for header in [&model.header, &scalers.header] {
        if header.schema_version > ARTIFACT_SCHEMA_VERSION {
            return Err(mismatch(
                format!("schema version <= {ARTIFACT_SCHEMA_VERSION}"),
                header.schema_version,
            ));
        }
    }
    if model.header != scalers.header {
        return Err(mismatch(
            format!("model bundle {}", model.header.bundle_id),
            format!("scaler bundle {}", scalers.header.bundle_id),
        ));
    }
    let header = model.header;
    let recomputed = bundle_id(
        &header.feature_columns,
        header.lookback,
        &scalers.features,
        &scalers.target,
    )?;
    if recomputed != header.bundle_id {
        return Err(mismatch(header.bundle_id, recomputed));
    }
    if scalers.features.n_columns() != header.feature_columns.len()
        || model.network.n_features() != header.feature_columns.len()
    {
        return Err(mismatch(
            format!("{} features", header.feature_columns.len()),
            format!(
                "scaler {} / network {}",
                scalers.features.n_columns(),
                model.network.n_features()
            ),
        ));
    }

    tracing::info!(dir = %dir.display(), bundle = %header.bundle_id.short(), "artifact bundle loaded");
    Ok(SequenceForecaster {
        header,
        network: model.network,
        feature_scaler: scalers.features,
        target_scaler: scalers.target,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::forecaster::{CancellationToken, Forecaster, ForecasterConfig};
    use crate::indicators::make_table;

    fn trained() -> (SequenceForecaster, crate::domain::TimeSeriesTable) {
        let closes: Vec<f64> = (0..50).map(|i| 50.0 + (i as f64 * 0.4).cos()).collect();
        let table = make_table(&closes);
        let cfg = ForecasterConfig {
            lookback: 4,
            epochs: 2,
            hidden: [3, 2],
            ..ForecasterConfig::default()
        };
        let (model, _) = SequenceForecaster::train(&table, &cfg, &CancellationToken::new()).unwrap();
        (model, table)
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (model, table) = trained();
        save_bundle(dir.path(), &model).unwrap();
        let loaded = load_bundle(dir.path()).unwrap();
        assert_eq!(loaded.header(), model.header());
        assert_eq!(
            loaded.predict_log_return(&table).unwrap(),
            model.predict_log_return(&table).unwrap()
        );
    }

    #[test]
    fn missing_bundle_is_model_not_trained() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_bundle(dir.path()),
            Err(PipelineError::ModelNotTrained { .. })
        ));
    }

    #[test]
    fn scalers_from_another_run_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (model, _) = trained();
        save_bundle(dir.path(), &model).unwrap();

        let mut other = model.clone();
        other.header.bundle_id = BundleId::from_bytes(b"another run");
        let scalers = ScalerArtifact {
            header: other.header.clone(),
            features: other.feature_scaler.clone(),
            target: other.target_scaler.clone(),
        };
        fs::write(
            dir.path().join(SCALERS_FILE),
            serde_json::to_string(&scalers).unwrap(),
        )
        .unwrap();
        assert!(matches!(
            load_bundle(dir.path()),
            Err(PipelineError::ArtifactMismatch { .. })
        ));
    }

    #[test]
    fn newer_schema_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let (mut model, _) = trained();
        model.header.schema_version = ARTIFACT_SCHEMA_VERSION + 1;
        save_bundle(dir.path(), &model).unwrap();
        assert!(matches!(
            load_bundle(dir.path()),
            Err(PipelineError::ArtifactMismatch { .. })
        ));
    }
}
