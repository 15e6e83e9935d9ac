//! Module loader: resolves `import` statements against a search path, parses
//! and executes `.na` sources, and installs exported symbols in the function
//! registry (spec section 4.6).

mod loaderror;

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, error, trace};

use crate::error::{DanaError, SourceSpan, Traced};
use crate::interpreter::Interpreter;

use self::loaderror::FileLoadError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ModuleState {
    Loading,
    Loaded,
}

/// Resolves, parses, executes and caches Dana modules by canonicalized path
/// (spec section 4.6 step 5 / spec.md section 8.1 invariant 5: import
/// idempotence). A module under active load is recorded as `Loading` so a
/// cycle back into it is detected rather than re-entered (spec section 4.6:
/// "Circular imports: detected; the partially-initialized module's symbol
/// table is exposed").
#[derive(Default)]
pub struct ModuleLoader {
    search_paths: Vec<PathBuf>,
    modules: RefCell<HashMap<PathBuf, ModuleState>>,
}

impl ModuleLoader {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self {
            search_paths,
            modules: RefCell::new(HashMap::new()),
        }
    }

    /// Resolves `path.to.module` against the configured search paths,
    /// appending the conventional `.na` extension.
    fn resolve(&self, path: &[String]) -> Result<PathBuf, FileLoadError> {
        let relative: PathBuf = path.iter().collect();
        let mut relative = relative;
        relative.set_extension("na");
        for root in &self.search_paths {
            let candidate = root.join(&relative);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        Err(FileLoadError {
            message: format!("could not resolve module '{}' on the search path", path.join(".")),
            span: SourceSpan::unknown(),
        })
    }

    /// `import path.to.module [as ns]` (spec section 4.6). Namespace symbols
    /// under `alias` if given, otherwise under the module's own file stem.
    pub fn load(
        &mut self,
        interp: &mut Interpreter,
        path: &[String],
        alias: Option<&str>,
    ) -> Result<(), Traced> {
        let resolved = self.resolve(path).map_err(|e| Traced::new(DanaError::ArgumentError {
            message: e.message,
            span: e.span,
        }))?;
        let canonical = resolved.canonicalize().unwrap_or(resolved.clone());
        let namespace = alias
            .map(str::to_string)
            .unwrap_or_else(|| path.last().cloned().unwrap_or_default());

        match self.modules.borrow().get(&canonical) {
            Some(ModuleState::Loaded) => {
                trace!("module '{}' already loaded, skipping re-execution", canonical.display());
                return Ok(());
            }
            Some(ModuleState::Loading) => {
                return Err(Traced::new(DanaError::CircularImport {
                    module: canonical.display().to_string(),
                    name: namespace,
                }));
            }
            None => {}
        }

        debug!("loading module '{}' as namespace '{namespace}'", canonical.display());
        self.modules
            .borrow_mut()
            .insert(canonical.clone(), ModuleState::Loading);

        let result = self.execute_module(interp, &canonical, &namespace);

        match &result {
            Ok(()) => {
                self.modules
                    .borrow_mut()
                    .insert(canonical.clone(), ModuleState::Loaded);
            }
            Err(err) => {
                error!("failed to load module '{}': {err}", canonical.display());
                self.modules.borrow_mut().remove(&canonical);
            }
        }
        result
    }

    fn execute_module(&self, interp: &mut Interpreter, path: &Path, namespace: &str) -> Result<(), Traced> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            Traced::new(DanaError::ArgumentError {
                message: format!("could not read module '{}': {e}", path.display()),
                span: SourceSpan::unknown(),
            })
        })?;
        let program = crate::parser::parse(&source).map_err(|e| {
            Traced::new(DanaError::ParseError {
                message: e.message,
                span: SourceSpan::new(path.display().to_string(), e.position.line, e.position.col),
            })
        })?;
        interp.exec_block(namespace, &program)?;
        Ok(())
    }
}
