use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

/// Read a document into a typed struct. `.yaml`/`.yml` files are parsed as
/// YAML, everything else as JSON.
pub fn read_document<T: DeserializeOwned>(path: &str) -> Result<T, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    let contents = fs::read_to_string(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
    let parsed = if is_yaml(&canonical) {
        serde_yaml::from_str(&contents).map_err(|e| e.to_string())
    } else {
        serde_json::from_str(&contents).map_err(|e| e.to_string())
    };
    let value = parsed.map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?;
    tracing::debug!(path = %canonical.display(), "read input document");
    Ok(value)
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Resolve against the working directory and require an existing file.
fn resolve_path(path: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let p = Path::new(path);
    let canonical = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()?.join(p)
    };

    if !canonical.exists() {
        return Err(format!("File not found: {}", canonical.display()).into());
    }
    if !canonical.is_file() {
        return Err(format!("Not a file: {}", canonical.display()).into());
    }
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kstock_core::portfolio_optimization::mean_variance::MeanVarianceInput;

    #[test]
    fn test_yaml_and_json_inputs_agree() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("mv.json");
        let yaml_path = dir.path().join("mv.yml");
        fs::write(
            &json_path,
            r#"{"asset_names": ["A", "B"], "expected_returns": ["0.1", "0.05"],
                "covariance_matrix": [["0.04", "0"], ["0", "0.01"]]}"#,
        )
        .unwrap();
        fs::write(
            &yaml_path,
            "asset_names: [A, B]\nexpected_returns: [\"0.1\", \"0.05\"]\ncovariance_matrix:\n  - [\"0.04\", \"0\"]\n  - [\"0\", \"0.01\"]\n",
        )
        .unwrap();
        let from_json: MeanVarianceInput = read_document(json_path.to_str().unwrap()).unwrap();
        let from_yaml: MeanVarianceInput = read_document(yaml_path.to_str().unwrap()).unwrap();
        assert_eq!(from_json.expected_returns, from_yaml.expected_returns);
        assert_eq!(from_json.covariance_matrix, from_yaml.covariance_matrix);
        assert!(from_yaml.max_weight.is_none());
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = read_document::<MeanVarianceInput>("/nonexistent/input.json").unwrap_err();
        assert!(err.to_string().contains("File not found"));
    }
}
