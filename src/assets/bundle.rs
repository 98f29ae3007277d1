//! CommonJS bundler for the application scripts.
//!
//! Starting from the entry module, `require('...')` calls are followed to
//! build the module graph, and every module is wrapped into a single
//! self-executing bundle. Two source transforms run on each module before
//! its requires are scanned:
//!
//! - `fs.readFileSync(__dirname + '/file', ...)`, or the same call on
//!   `require('fs')`, is replaced by the file's contents as a string
//!   literal, so templates ship inside the bundle.
//! - `process.env.NAME` is replaced by the configured value for `NAME`.
//!
//! Transformed modules are cached by a fingerprint of their source and of
//! every file they inlined, which keeps rebundles in watch mode cheap.

use std::{
    collections::{HashMap, VecDeque},
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use parking_lot::Mutex;
use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::error::{DevflowError, Result};

const STAGE: &str = "browserify";

/// Node core modules that resolve to an empty object in the browser.
const EMPTY_BUILTINS: &[&str] = &["fs", "child_process", "net", "tls", "dgram", "module"];

const BUILTIN_PREFIX: &str = "\0builtin";

static REQUIRE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\brequire\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());

static PROCESS_ENV: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bprocess\.env\.([A-Za-z_$][A-Za-z0-9_$]*)").unwrap());

static READ_FILE_SYNC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?:\bfs|\brequire\(\s*['"]fs['"]\s*\))\.readFileSync\(\s*__dirname\s*\+\s*['"]([^'"]+)['"]\s*(?:,\s*(?:['"][^'"]*['"]|\{[^}]*\})\s*)?\)"#,
    )
    .unwrap()
});

const PRELUDE: &str = r#"(function (modules, entry) {
  var cache = {};
  function load(id) {
    if (cache[id]) {
      return cache[id].exports;
    }
    var module = cache[id] = { exports: {} };
    var definition = modules[id];
    definition[0].call(module.exports, function (name) {
      var dep = definition[1][name];
      if (dep === undefined) {
        throw new Error("Cannot find module '" + name + "'");
      }
      return load(dep);
    }, module, module.exports);
    return module.exports;
  }
  load(entry);
})({
"#;

#[derive(Debug, Clone)]
pub struct BundleOptions {
    pub root: PathBuf,
    pub entry: PathBuf,
    pub output: PathBuf,
    /// Values for `process.env.*` references.
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone)]
struct Module {
    code: String,
    requires: Vec<String>,
    inlined: Vec<PathBuf>,
    fingerprint: blake3::Hash,
}

#[derive(Debug)]
pub struct Bundle {
    pub code: String,
    /// Source files that ended up in the bundle, entry first.
    pub modules: Vec<PathBuf>,
    /// How many modules were taken from the cache.
    pub reused: usize,
}

#[derive(Debug)]
pub struct Bundler {
    options: BundleOptions,
    cache: Mutex<HashMap<PathBuf, Module>>,
}

impl Bundler {
    pub fn new(options: BundleOptions) -> Self {
        Self {
            options,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> &BundleOptions {
        &self.options
    }

    /// Builds the bundle and writes it to the configured output path.
    pub fn write(&self) -> Result<Bundle> {
        let bundle = self.bundle()?;

        if let Some(parent) = self.options.output.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.options.output, &bundle.code)?;

        tracing::debug!(
            "Wrote {} ({} modules, {} cached)",
            self.options.output.display(),
            bundle.modules.len(),
            bundle.reused
        );
        Ok(bundle)
    }

    pub fn bundle(&self) -> Result<Bundle> {
        let root = fs::canonicalize(&self.options.root).unwrap_or_else(|_| self.options.root.clone());
        let entry = fs::canonicalize(&self.options.entry).map_err(|e| {
            DevflowError::transform(
                STAGE,
                format!(
                    "Cannot find entry module '{}': {}",
                    self.options.entry.display(),
                    e
                ),
            )
        })?;

        let mut cache = self.cache.lock();
        let mut ids: HashMap<PathBuf, usize> = HashMap::from([(entry.clone(), 0)]);
        let mut queue = VecDeque::from([entry]);
        let mut rendered = Vec::new();
        let mut modules = Vec::new();
        let mut reused = 0;

        while let Some(path) = queue.pop_front() {
            let id = rendered.len();

            if path.starts_with(BUILTIN_PREFIX) {
                rendered.push(render_module(id, &path.to_string_lossy(), "", &Map::new()));
                continue;
            }

            let (module, from_cache) = load_module(&path, &self.options.env, &mut cache)?;
            if from_cache {
                reused += 1;
            }

            let dir = path.parent().unwrap_or(&root);
            let mut deps = Map::new();
            for specifier in &module.requires {
                let target = resolve(specifier, dir, &root).ok_or_else(|| {
                    DevflowError::transform(
                        STAGE,
                        format!(
                            "Cannot find module '{}' from '{}'",
                            specifier,
                            relative(&path, &root)
                        ),
                    )
                })?;

                let next_id = ids.len();
                let dep_id = *ids.entry(target.clone()).or_insert_with(|| {
                    queue.push_back(target);
                    next_id
                });
                deps.insert(specifier.clone(), Value::from(dep_id));
            }

            rendered.push(render_module(id, &relative(&path, &root), &module.code, &deps));
            modules.push(path);
        }

        let mut code = String::from(PRELUDE);
        for module in &rendered {
            code.push_str(module);
        }
        code.push_str("}, 0);\n");

        Ok(Bundle {
            code,
            modules,
            reused,
        })
    }
}

fn load_module(
    path: &Path,
    env: &HashMap<String, String>,
    cache: &mut HashMap<PathBuf, Module>,
) -> Result<(Module, bool)> {
    let source = fs::read_to_string(path).map_err(|e| {
        DevflowError::transform(STAGE, format!("Cannot read '{}': {}", path.display(), e))
    })?;

    if let Some(cached) = cache.get(path) {
        if fingerprint(&source, &cached.inlined) == cached.fingerprint {
            return Ok((cached.clone(), true));
        }
    }

    let module = transform_module(path, &source, env)?;
    cache.insert(path.to_path_buf(), module.clone());
    Ok((module, false))
}

fn transform_module(path: &Path, source: &str, env: &HashMap<String, String>) -> Result<Module> {
    if path.extension().is_some_and(|ext| ext == "json") {
        return Ok(Module {
            code: format!("module.exports = {};", source.trim()),
            requires: Vec::new(),
            inlined: Vec::new(),
            fingerprint: fingerprint(source, &[]),
        });
    }

    let dir = path.parent().unwrap_or(Path::new("."));
    let mut inlined = Vec::new();
    let code = inline_files(source, dir, &mut inlined)?;
    let code = inject_env(&code, env);

    let mut requires: Vec<String> = Vec::new();
    for caps in REQUIRE.captures_iter(&strip_comments(&code)) {
        let specifier = caps[1].to_string();
        if !requires.contains(&specifier) {
            requires.push(specifier);
        }
    }

    Ok(Module {
        fingerprint: fingerprint(source, &inlined),
        code,
        requires,
        inlined,
    })
}

/// Drops `//` and `/* */` comments. String literals are copied as they are,
/// so a `//` inside a URL does not start a comment.
fn strip_comments(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut chars = code.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                out.push(c);
                while let Some(inner) = chars.next() {
                    out.push(inner);
                    if inner == '\\' {
                        if let Some(escaped) = chars.next() {
                            out.push(escaped);
                        }
                    } else if inner == c {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'/') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut previous = '\0';
                for skipped in chars.by_ref() {
                    if previous == '*' && skipped == '/' {
                        break;
                    }
                    previous = skipped;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }

    out
}

fn fingerprint(source: &str, inlined: &[PathBuf]) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(source.as_bytes());
    for path in inlined {
        hasher.update(path.to_string_lossy().as_bytes());
        match fs::read(path) {
            Ok(contents) => hasher.update(&contents),
            Err(_) => hasher.update(b"\0missing"),
        };
    }
    hasher.finalize()
}

fn js_string(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}

fn inline_files(source: &str, dir: &Path, inlined: &mut Vec<PathBuf>) -> Result<String> {
    let mut out = String::with_capacity(source.len());
    let mut last = 0;

    for caps in READ_FILE_SYNC.captures_iter(source) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let file = dir.join(caps[1].trim_start_matches('/'));
        let contents = fs::read_to_string(&file).map_err(|e| {
            DevflowError::transform(STAGE, format!("Cannot inline '{}': {}", file.display(), e))
        })?;

        out.push_str(&source[last..whole.start()]);
        out.push_str(&js_string(&contents));
        last = whole.end();
        inlined.push(file);
    }

    out.push_str(&source[last..]);
    Ok(out)
}

fn inject_env(source: &str, env: &HashMap<String, String>) -> String {
    PROCESS_ENV
        .replace_all(source, |caps: &Captures| match env.get(&caps[1]) {
            Some(value) => js_string(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn resolve(specifier: &str, from_dir: &Path, root: &Path) -> Option<PathBuf> {
    let is_relative = specifier.starts_with("./") || specifier.starts_with("../");
    if is_relative || specifier == "." || specifier == ".." {
        return resolve_path(&from_dir.join(specifier));
    }
    if let Some(absolute) = specifier.strip_prefix('/') {
        return resolve_path(&root.join(absolute));
    }
    if EMPTY_BUILTINS.contains(&specifier) {
        return Some(Path::new(BUILTIN_PREFIX).join(specifier));
    }

    let mut dir = Some(from_dir);
    while let Some(current) = dir {
        if let Some(found) = resolve_path(&current.join("node_modules").join(specifier)) {
            return Some(found);
        }
        if current == root {
            break;
        }
        dir = current.parent();
    }

    None
}

fn with_extension_appended(base: &Path, ext: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

fn resolve_file(base: &Path) -> Option<PathBuf> {
    if base.is_file() {
        return fs::canonicalize(base).ok();
    }
    ["js", "json"]
        .iter()
        .map(|ext| with_extension_appended(base, ext))
        .find(|candidate| candidate.is_file())
        .and_then(|candidate| fs::canonicalize(candidate).ok())
}

fn resolve_path(base: &Path) -> Option<PathBuf> {
    if let Some(file) = resolve_file(base) {
        return Some(file);
    }
    if !base.is_dir() {
        return None;
    }

    let main = fs::read_to_string(base.join("package.json"))
        .ok()
        .and_then(|text| serde_json::from_str::<Value>(&text).ok())
        .and_then(|package| package.get("main").and_then(Value::as_str).map(str::to_string));

    if let Some(main) = main {
        let main_path = base.join(main);
        if let Some(file) = resolve_file(&main_path).or_else(|| resolve_file(&main_path.join("index")))
        {
            return Some(file);
        }
    }

    resolve_file(&base.join("index"))
}

fn relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn render_module(id: usize, label: &str, code: &str, deps: &Map<String, Value>) -> String {
    format!(
        "{id}: [function (require, module, exports) {{\n// {label}\n{code}\n}}, {deps}],\n",
        label = label.trim_start_matches(BUILTIN_PREFIX),
        deps = Value::Object(deps.clone())
    )
}
