use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::decl::Declaration;
use crate::descriptor::method_param_count;
use crate::equations::Equation;
use crate::keys::RawKey;

/// Input bundle: declarations under analysis plus the raw equations the
/// bytecode walk extracted for them and their dependencies.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct Bundle {
    #[serde(default)]
    pub(crate) declarations: Vec<Declaration>,
    #[serde(default)]
    pub(crate) equations: Vec<Equation>,
}

/// Read and validate a JSON bundle. Parse errors carry the JSON path to the
/// offending element.
pub(crate) fn load_bundle(path: &Path) -> Result<Bundle> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut deserializer = serde_json::Deserializer::from_reader(reader);
    let bundle: Bundle = serde_path_to_error::deserialize(&mut deserializer)
        .with_context(|| format!("failed to parse equation bundle {}", path.display()))?;
    validate(&bundle)?;
    Ok(bundle)
}

fn validate(bundle: &Bundle) -> Result<()> {
    for equation in &bundle.equations {
        check_key(&equation.id)?;
    }
    Ok(())
}

fn check_key(key: &RawKey) -> Result<()> {
    let param_count = method_param_count(&key.member.descriptor).with_context(|| {
        format!(
            "invalid descriptor for {}.{}",
            key.member.owner, key.member.name
        )
    })?;
    if let Some((param, _)) = key.direction.param_constraint() {
        if usize::from(param) >= param_count {
            warn!(
                owner = %key.member.owner,
                name = %key.member.name,
                param,
                param_count,
                "equation constrains a parameter outside the descriptor arity"
            );
        }
    }
    Ok(())
}
