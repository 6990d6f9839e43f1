// src/cli/validate.rs — Request file validation

use std::path::Path;

use crate::core::request::StructuredInput;

/// Load and validate a request, then print what a run would work on.
pub fn validate_request(path: &Path) -> anyhow::Result<()> {
    let input = StructuredInput::load(path)?;
    input.validate()?;

    println!("{} is valid", path.display());
    println!("  Topic:      {}", input.topic());
    println!("  Objectives: {}", input.objectives.len());
    if !input.key_concepts.is_empty() {
        println!("  Concepts:   {}", input.key_concepts.join(", "));
    }
    println!("  Tone:       {}", input.style.tone.as_str());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_good_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("req.json");
        std::fs::write(
            &path,
            r#"{"domain": "Databases", "audience": "students", "objectives": ["Explain indexes"]}"#,
        )
        .unwrap();
        assert!(validate_request(&path).is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_objective() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("req.json");
        std::fs::write(&path, r#"{"domain": "Databases", "objectives": []}"#).unwrap();
        assert!(validate_request(&path).is_err());
    }
}
