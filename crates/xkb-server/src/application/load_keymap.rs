//! LoadKeymapUseCase: compiles the startup keymap, falling back to the
//! built-in one.
//!
//! # Why a fallback? (for beginners)
//!
//! Keymaps are described by component names ("evdev" rules, "pc105" model,
//! "us" layout, ...) that an external compiler turns into tables.  If the
//! compiler does not know a name, or hands back tables that contradict
//! themselves, the keyboard must still work.  The use case logs the
//! diagnostics and installs the built-in US keymap instead.
//!
//! Compilation can be slow, so [`KeymapCompiler::compile`] is `async` and is
//! never called with the keyboard device locked.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};
use xkb_core::keymap::{default::default_keymap, AtomTable, Keymap, KeymapError};

/// Component names handed to the keymap compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeymapComponents {
    pub rules: String,
    pub model: String,
    pub layout: String,
    pub variant: String,
    pub options: String,
}

impl Default for KeymapComponents {
    fn default() -> Self {
        Self {
            rules: "evdev".to_string(),
            model: "pc105".to_string(),
            layout: "us".to_string(),
            variant: String::new(),
            options: String::new(),
        }
    }
}

/// What to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeymapSource {
    Components(KeymapComponents),
    /// A complete keymap in the compiler's text format.
    Text(String),
}

/// Diagnostics from a failed compilation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("unknown layout {0:?}")]
    UnknownLayout(String),
    #[error("unknown rules {0:?}")]
    UnknownRules(String),
    #[error("compiler produced an empty keymap")]
    EmptyKeymap,
    /// The compiled keymap failed validation.
    #[error("inconsistent keymap: {0}")]
    Inconsistent(String),
    #[error("source not supported by this compiler: {0}")]
    UnsupportedSource(String),
}

/// Turns keymap descriptions into keymaps.
///
/// Names the compiler interns go into `atoms`.
#[async_trait]
pub trait KeymapCompiler: Send + Sync {
    async fn compile(
        &self,
        source: &KeymapSource,
        atoms: &mut AtomTable,
    ) -> Result<Keymap, CompileError>;
}

/// Result of [`LoadKeymapUseCase::load`].
#[derive(Debug)]
pub struct LoadedKeymap {
    pub keymap: Keymap,
    /// `true` when the built-in keymap replaced a failed compilation.
    pub fallback: bool,
}

pub struct LoadKeymapUseCase {
    compiler: Arc<dyn KeymapCompiler>,
}

impl LoadKeymapUseCase {
    pub fn new(compiler: Arc<dyn KeymapCompiler>) -> Self {
        Self { compiler }
    }

    /// Compiles `source`, checking the result before handing it out.
    ///
    /// # Errors
    ///
    /// Only if the built-in fallback itself cannot be built.
    pub async fn load(
        &self,
        source: &KeymapSource,
        atoms: &mut AtomTable,
    ) -> Result<LoadedKeymap, KeymapError> {
        match self.compile_checked(source, atoms).await {
            Ok(keymap) => {
                info!(
                    min = keymap.min_key_code,
                    max = keymap.max_key_code,
                    "keymap compiled"
                );
                Ok(LoadedKeymap {
                    keymap,
                    fallback: false,
                })
            }
            Err(e) => {
                warn!(?source, "keymap compilation failed, using built-in keymap: {e}");
                Ok(LoadedKeymap {
                    keymap: default_keymap(atoms)?,
                    fallback: true,
                })
            }
        }
    }

    async fn compile_checked(
        &self,
        source: &KeymapSource,
        atoms: &mut AtomTable,
    ) -> Result<Keymap, CompileError> {
        let keymap = self.compiler.compile(source, atoms).await?;
        if keymap.map.is_none() {
            return Err(CompileError::EmptyKeymap);
        }
        keymap
            .validate()
            .map_err(|e| CompileError::Inconsistent(e.to_string()))?;
        Ok(keymap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio_test::{assert_ok, block_on};
    use xkb_core::keymap::map_parts;

    // ── Test doubles ──────────────────────────────────────────────────────────

    /// Hands out a canned result and records what it was asked to compile.
    struct StubCompiler {
        result: Mutex<Option<Result<Keymap, CompileError>>>,
        requests: Mutex<Vec<KeymapSource>>,
    }

    impl StubCompiler {
        fn returning(result: Result<Keymap, CompileError>) -> Arc<Self> {
            Arc::new(Self {
                result: Mutex::new(Some(result)),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl KeymapCompiler for StubCompiler {
        async fn compile(
            &self,
            source: &KeymapSource,
            _atoms: &mut AtomTable,
        ) -> Result<Keymap, CompileError> {
            self.requests.lock().unwrap().push(source.clone());
            self.result
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(CompileError::EmptyKeymap))
        }
    }

    fn make_small_keymap() -> Keymap {
        let mut keymap = Keymap::new(8, 100).unwrap();
        keymap
            .allocate_client_map(map_parts::KEY_SYMS | map_parts::KEY_TYPES, 4)
            .unwrap();
        keymap
    }

    // ── Tests ─────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_successful_compile_is_used() {
        // Arrange
        let compiler = StubCompiler::returning(Ok(make_small_keymap()));
        let use_case = LoadKeymapUseCase::new(compiler.clone());
        let source = KeymapSource::Components(KeymapComponents::default());
        let mut atoms = AtomTable::new();

        // Act
        let loaded = use_case.load(&source, &mut atoms).await.unwrap();

        // Assert
        assert!(!loaded.fallback);
        assert_eq!(loaded.keymap.max_key_code, 100);
        assert_eq!(*compiler.requests.lock().unwrap(), vec![source]);
    }

    #[tokio::test]
    async fn test_compile_error_falls_back_to_builtin() {
        // Arrange
        let compiler =
            StubCompiler::returning(Err(CompileError::UnknownLayout("klingon".to_string())));
        let use_case = LoadKeymapUseCase::new(compiler);
        let mut atoms = AtomTable::new();

        // Act
        let loaded = use_case
            .load(&KeymapSource::Text("xkb_keymap {}".into()), &mut atoms)
            .await
            .unwrap();

        // Assert
        assert!(loaded.fallback);
        assert_eq!(loaded.keymap.min_key_code, 8);
        assert!(loaded.keymap.map.is_some());
    }

    #[test]
    fn test_keymap_without_client_map_is_rejected() {
        // Arrange
        let empty = Keymap::new(8, 255).unwrap();
        let use_case = LoadKeymapUseCase::new(StubCompiler::returning(Ok(empty)));
        let mut atoms = AtomTable::new();

        // Act
        let loaded = assert_ok!(block_on(use_case.load(
            &KeymapSource::Components(KeymapComponents::default()),
            &mut atoms,
        )));

        // Assert
        assert!(loaded.fallback);
    }

    #[test]
    fn test_inconsistent_keymap_is_rejected() {
        // Arrange
        let mut broken = make_small_keymap();
        if let Some(map) = broken.map.as_mut() {
            map.num_syms = map.syms.len() + 1;
        }
        let use_case = LoadKeymapUseCase::new(StubCompiler::returning(Ok(broken)));
        let mut atoms = AtomTable::new();

        // Act
        let loaded = assert_ok!(block_on(use_case.load(
            &KeymapSource::Components(KeymapComponents::default()),
            &mut atoms,
        )));

        // Assert
        assert!(loaded.fallback);
        assert!(loaded.keymap.validate().is_ok());
    }

    #[test]
    fn test_compile_error_messages_name_the_component() {
        assert_eq!(
            CompileError::UnknownRules("base2".into()).to_string(),
            "unknown rules \"base2\""
        );
    }
}
