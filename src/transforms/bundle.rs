//! CommonJS bundler.
//!
//! Starting from an entry module, every `require('...')` call is resolved to
//! a file, modules are numbered in discovery order (the entry is `1`) and the
//! result is a single script: a small loader followed by a module table that
//! maps each id to its wrapped source and its specifier → id map.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::Range;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::BundleError;

#[allow(clippy::expect_used)]
static REQUIRE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\brequire\(\s*['"]([^'"]+)['"]\s*\)"#).expect("valid require regex")
});

const PRELUDE: &str = "(function (modules, entry) {
  var cache = {};
  function load(id) {
    if (cache[id]) return cache[id].exports;
    var module = cache[id] = { exports: {} };
    var def = modules[id];
    def[0].call(module.exports, function (name) {
      var dep = def[1][name];
      if (dep === undefined) throw new Error(\"Cannot find module '\" + name + \"'\");
      return load(dep);
    }, module, module.exports);
    return module.exports;
  }
  load(entry);
})({
";

/// A bundled module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    /// Numeric id, `1` for the entry.
    pub id: usize,
    /// Canonical source path.
    pub path: PathBuf,
    /// Specifier → module id for each `require()` in the source.
    pub deps: BTreeMap<String, usize>,
    source: String,
}

/// The output of [`bundle`].
#[derive(Debug, Clone)]
pub struct Bundle {
    /// Modules in id order.
    pub modules: Vec<Module>,
}

impl Bundle {
    /// Render the self-contained script.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::from(PRELUDE);
        for (i, module) in self.modules.iter().enumerate() {
            if i > 0 {
                out.push_str(",\n");
            }
            let deps = serde_json::to_string(&module.deps).unwrap_or_else(|_| "{}".to_string());
            out.push_str(&format!(
                "{}:[function (require, module, exports) {{\n{}\n}}, {deps}]",
                module.id,
                module.source.trim_end()
            ));
        }
        out.push_str("\n}, 1);\n");
        out
    }
}

/// Bundle `entry` and everything it transitively requires.
///
/// Bare specifiers (`lodash`, `lodash/fp`) are looked up in `node_modules`
/// directories above the requiring file and then in `deps_root`.
///
/// # Errors
///
/// Returns [`BundleError::Unresolved`] naming the specifier and the requiring
/// file, [`BundleError::Io`] if a module cannot be read, or
/// [`BundleError::Manifest`] for a malformed `package.json`.
pub fn bundle(entry: &Path, deps_root: &Path) -> Result<Bundle, BundleError> {
    let entry = canonical(entry)?;
    let mut ids: HashMap<PathBuf, usize> = HashMap::from([(entry.clone(), 1)]);
    let mut queue = VecDeque::from([entry]);
    let mut modules = Vec::new();

    while let Some(path) = queue.pop_front() {
        let raw = fs::read_to_string(&path).map_err(|source| BundleError::Io {
            path: path.clone(),
            source,
        })?;
        let source = if path.extension().is_some_and(|e| e == "json") {
            format!("module.exports = {};", raw.trim())
        } else {
            raw
        };
        let dir = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        let ignored = ignored_spans(&source);
        let mut deps = BTreeMap::new();
        for spec in REQUIRE_RE
            .captures_iter(&source)
            .filter(|c| {
                c.get(0)
                    .is_some_and(|m| !ignored.iter().any(|r| r.contains(&m.start())))
            })
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str())
        {
            if deps.contains_key(spec) {
                continue;
            }
            let resolved = resolve(spec, &dir, deps_root)?.ok_or_else(|| BundleError::Unresolved {
                module: spec.to_string(),
                from: path.clone(),
            })?;
            let next_id = ids.len() + 1;
            let id = *ids.entry(resolved.clone()).or_insert_with(|| {
                queue.push_back(resolved);
                next_id
            });
            deps.insert(spec.to_string(), id);
        }

        let id = ids.get(&path).copied().unwrap_or(1);
        modules.push(Module {
            id,
            path,
            deps,
            source,
        });
    }

    modules.sort_by_key(|m| m.id);
    Ok(Bundle { modules })
}

/// Byte ranges of comments and string literals in `source`.
///
/// A `require(...)` starting inside one of these is not a dependency.
fn ignored_spans(source: &str) -> Vec<Range<usize>> {
    let bytes = source.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;
    while let Some(&b) = bytes.get(i) {
        let end = match (b, bytes.get(i + 1)) {
            (b'/', Some(b'/')) => find_from(bytes, i + 2, b"\n").unwrap_or(bytes.len()),
            (b'/', Some(b'*')) => find_from(bytes, i + 2, b"*/").map_or(bytes.len(), |e| e + 2),
            (b'\'' | b'"' | b'`', _) => string_end(bytes, i + 1, b),
            _ => {
                i += 1;
                continue;
            }
        };
        spans.push(i..end);
        i = end;
    }
    spans
}

fn find_from(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// End (exclusive) of a string literal whose body starts at `from`.
fn string_end(bytes: &[u8], from: usize, quote: u8) -> usize {
    let mut i = from;
    while let Some(&b) = bytes.get(i) {
        match b {
            b'\\' => i += 2,
            b'\n' if quote != b'`' => return i,
            _ if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn canonical(path: &Path) -> Result<PathBuf, BundleError> {
    dunce::canonicalize(path).map_err(|source| BundleError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolve one `require()` specifier from a module in `dir`.
fn resolve(spec: &str, dir: &Path, deps_root: &Path) -> Result<Option<PathBuf>, BundleError> {
    if spec.starts_with("./") || spec.starts_with("../") || spec.starts_with('/') {
        return resolve_path(&dir.join(spec));
    }
    let search = dir
        .ancestors()
        .map(|d| d.join("node_modules"))
        .chain(std::iter::once(deps_root.to_path_buf()));
    for base in search {
        if !base.is_dir() {
            continue;
        }
        if let Some(found) = resolve_path(&base.join(spec))? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// Try `path` as a file (`x`, `x.js`, `x.json`), then as a directory.
fn resolve_path(path: &Path) -> Result<Option<PathBuf>, BundleError> {
    if let Some(file) = resolve_file(path) {
        return canonical(&file).map(Some);
    }
    if path.is_dir() {
        return resolve_directory(path);
    }
    Ok(None)
}

fn resolve_file(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    let name = path.file_name()?.to_str()?;
    ["js", "json"]
        .iter()
        .map(|ext| path.with_file_name(format!("{name}.{ext}")))
        .find(|p| p.is_file())
}

/// A package directory: `package.json` `browser` (string form) or `main`,
/// falling back to `index.js`.
fn resolve_directory(dir: &Path) -> Result<Option<PathBuf>, BundleError> {
    let manifest = dir.join("package.json");
    if manifest.is_file() {
        let text = fs::read_to_string(&manifest).map_err(|source| BundleError::Io {
            path: manifest.clone(),
            source,
        })?;
        let json: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| BundleError::Manifest {
                path: manifest.clone(),
                message: e.to_string(),
            })?;
        let main = json
            .get("browser")
            .and_then(serde_json::Value::as_str)
            .or_else(|| json.get("main").and_then(serde_json::Value::as_str));
        if let Some(main) = main {
            let target = dir.join(main);
            if let Some(file) = resolve_file(&target) {
                return canonical(&file).map(Some);
            }
            let index = target.join("index.js");
            if index.is_file() {
                return canonical(&index).map(Some);
            }
        }
    }
    let index = dir.join("index.js");
    if index.is_file() {
        return canonical(&index).map(Some);
    }
    Ok(None)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn relative_modules_are_numbered_in_discovery_order() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(
            dir.path(),
            "src/main.js",
            "var a = require('./a');\nvar b = require(\"./lib\");\n",
        );
        write(dir.path(), "src/a.js", "module.exports = require('./lib/index.js');\n");
        write(dir.path(), "src/lib/index.js", "module.exports = 42;\n");

        let bundle = bundle(&entry, &dir.path().join("node_modules")).unwrap();
        assert_eq!(bundle.modules.len(), 3);
        let main = &bundle.modules[0];
        assert_eq!(main.id, 1);
        assert_eq!(main.deps["./a"], 2);
        assert_eq!(main.deps["./lib"], 3);
        assert_eq!(bundle.modules[1].deps["./lib/index.js"], 3, "same file, same id");
    }

    #[test]
    fn requires_in_comments_and_strings_are_not_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(
            dir.path(),
            "src/main.js",
            "// var old = require('./removed');\n\
             /* require('./gone')\n   still a comment */\n\
             var msg = \"call require('./nope') yourself\";\n\
             var url = 'http://example.com'; var a = require('./a');\n",
        );
        write(dir.path(), "src/a.js", "module.exports = 1;\n");

        let bundle = bundle(&entry, &dir.path().join("node_modules")).unwrap();
        assert_eq!(bundle.modules.len(), 2);
        assert_eq!(
            bundle.modules[0].deps.keys().collect::<Vec<_>>(),
            ["./a"]
        );
    }

    #[test]
    fn ignored_spans_cover_comments_and_literals() {
        let src = "a // x\nb /* y */ 'c\\'d' `e`";
        let spans: Vec<&str> = ignored_spans(src).into_iter().map(|r| &src[r]).collect();
        assert_eq!(spans, ["// x", "/* y */", "'c\\'d'", "`e`"]);
    }

    #[test]
    fn packages_resolve_through_manifest_main() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(dir.path(), "app/main.js", "require('widget');\nrequire('plain');\n");
        write(
            dir.path(),
            "deps/widget/package.json",
            r#"{"name": "widget", "main": "dist/widget"}"#,
        );
        write(dir.path(), "deps/widget/dist/widget.js", "module.exports = 'w';\n");
        write(dir.path(), "deps/plain/index.js", "module.exports = 'p';\n");

        let bundle = bundle(&entry, &dir.path().join("deps")).unwrap();
        let paths: Vec<String> = bundle
            .modules
            .iter()
            .map(|m| m.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(paths, ["main.js", "widget.js", "index.js"]);
    }

    #[test]
    fn json_modules_export_their_content() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(dir.path(), "main.js", "var c = require('./config');\n");
        write(dir.path(), "config.json", "{\"debug\": true}\n");
        let rendered = bundle(&entry, dir.path()).unwrap().render();
        assert!(rendered.contains("module.exports = {\"debug\": true};"));
    }

    #[test]
    fn cyclic_requires_share_ids() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(dir.path(), "a.js", "require('./b');\n");
        write(dir.path(), "b.js", "require('./a');\n");
        let bundle = bundle(&entry, dir.path()).unwrap();
        assert_eq!(bundle.modules.len(), 2);
        assert_eq!(bundle.modules[1].deps["./a"], 1);
    }

    #[test]
    fn unresolved_require_names_specifier_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(dir.path(), "main.js", "require('./missing');\n");
        let err = bundle(&entry, dir.path()).unwrap_err();
        let BundleError::Unresolved { module, from } = err else {
            panic!("expected Unresolved, got {err:?}");
        };
        assert_eq!(module, "./missing");
        assert!(from.ends_with("main.js"));
    }

    #[test]
    fn bad_manifest_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(dir.path(), "main.js", "require('broken');\n");
        write(dir.path(), "node_modules/broken/package.json", "{ not json");
        assert!(matches!(
            bundle(&entry, &dir.path().join("none")).unwrap_err(),
            BundleError::Manifest { .. }
        ));
    }

    #[test]
    fn render_wraps_modules_and_starts_entry() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(dir.path(), "main.js", "var x = require('./x');\n");
        write(dir.path(), "x.js", "module.exports = 1;\n");
        let rendered = bundle(&entry, dir.path()).unwrap().render();
        assert!(rendered.starts_with("(function (modules, entry) {"));
        assert!(rendered.contains("1:[function (require, module, exports) {\nvar x = require('./x');\n}, {\"./x\":2}]"));
        assert!(rendered.contains("2:[function (require, module, exports) {\nmodule.exports = 1;\n}, {}]"));
        assert!(rendered.ends_with("}, 1);\n"));
    }
}
