//! Built-in keymap compiler.
//!
//! Knows exactly one keymap: the US layout on evdev keycodes baked into the
//! core crate.  Any other rules or layout is reported as unknown so the
//! load use case can log it.  Raw keymap text needs an external compiler.

use async_trait::async_trait;
use tracing::debug;
use xkb_core::keymap::{default::default_keymap, AtomTable, Keymap};

use crate::application::load_keymap::{CompileError, KeymapCompiler, KeymapSource};

const KNOWN_RULES: &[&str] = &["evdev", "base"];
const KNOWN_LAYOUTS: &[&str] = &["us"];

#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinCompiler;

#[async_trait]
impl KeymapCompiler for BuiltinCompiler {
    async fn compile(
        &self,
        source: &KeymapSource,
        atoms: &mut AtomTable,
    ) -> Result<Keymap, CompileError> {
        let components = match source {
            KeymapSource::Components(components) => components,
            KeymapSource::Text(_) => {
                return Err(CompileError::UnsupportedSource("keymap text".to_string()))
            }
        };
        if !KNOWN_RULES.contains(&components.rules.as_str()) {
            return Err(CompileError::UnknownRules(components.rules.clone()));
        }
        if !KNOWN_LAYOUTS.contains(&components.layout.as_str()) {
            return Err(CompileError::UnknownLayout(components.layout.clone()));
        }
        debug!(
            model = %components.model,
            variant = %components.variant,
            options = %components.options,
            "model, variant and options ignored by the built-in compiler"
        );
        default_keymap(atoms).map_err(|e| CompileError::Inconsistent(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::load_keymap::KeymapComponents;
    use tokio_test::assert_err;

    fn components(rules: &str, layout: &str) -> KeymapSource {
        KeymapSource::Components(KeymapComponents {
            rules: rules.to_string(),
            layout: layout.to_string(),
            ..KeymapComponents::default()
        })
    }

    #[tokio::test]
    async fn test_us_layout_compiles() {
        let mut atoms = AtomTable::new();
        let keymap = BuiltinCompiler
            .compile(&components("evdev", "us"), &mut atoms)
            .await
            .expect("built-in layout");
        assert!(keymap.validate().is_ok());
    }

    #[tokio::test]
    async fn test_unknown_layout_is_reported() {
        let mut atoms = AtomTable::new();
        let result = BuiltinCompiler
            .compile(&components("evdev", "fr"), &mut atoms)
            .await;
        assert_eq!(result.unwrap_err(), CompileError::UnknownLayout("fr".into()));
    }

    #[tokio::test]
    async fn test_unknown_rules_are_reported() {
        let mut atoms = AtomTable::new();
        let result = BuiltinCompiler
            .compile(&components("xfree98", "us"), &mut atoms)
            .await;
        assert_eq!(result.unwrap_err(), CompileError::UnknownRules("xfree98".into()));
    }

    #[test]
    fn test_keymap_text_is_unsupported() {
        let mut atoms = AtomTable::new();
        let error = assert_err!(tokio_test::block_on(
            BuiltinCompiler.compile(&KeymapSource::Text("xkb_keymap {};".into()), &mut atoms)
        ));
        assert!(matches!(error, CompileError::UnsupportedSource(_)));
    }
}
