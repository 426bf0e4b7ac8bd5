//! One compilation: entries -> chunks -> emitted assets.
//!
//! Modules are not parsed. Each entry module is wrapped into a function and
//! registered with the runtime; the modules of an entry run in order.

use crate::compiler::assets::AssetGraph;
use crate::compiler::stats::{AssetInfo, ModuleInfo, Stats};
use crate::error::BuildError;
use devpack_config::{
    BuildConfig, EntryItem, HotClientOptions, LibraryTarget, RUNTIME_CHUNK_NAME,
};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Instant;

const RUNTIME_JS: &str = include_str!("../../assets/runtime.js");
const HOT_RUNTIME_JS: &str = include_str!("../../assets/hot-runtime.js");
const HOT_CLIENT_JS: &str = include_str!("../../assets/hot-client.js");

/// Hash length in hex characters.
const HASH_LENGTH: usize = 20;

/// What the next compilation needs to know about the previous one.
#[derive(Debug, Clone, Default)]
pub(crate) struct PreviousBuild {
    pub hash: String,
    /// Chunk name -> content hash
    pub chunk_hashes: HashMap<String, String>,
    /// Chunk name -> module ids
    pub chunk_modules: HashMap<String, Vec<usize>>,
}

pub(crate) struct CompilationOutput {
    pub assets: AssetGraph,
    pub stats: Stats,
    pub build: PreviousBuild,
}

struct SourceModule {
    id: usize,
    name: String,
    source: String,
}

struct Chunk {
    name: String,
    modules: Vec<SourceModule>,
    code: String,
}

#[derive(Serialize)]
struct HotUpdateManifest<'a> {
    /// Updated chunks
    c: Vec<&'a str>,
    /// Removed chunks
    r: Vec<&'a str>,
    /// Removed modules
    m: Vec<usize>,
}

/// Compile `config` with modules resolved against `context`.
///
/// Problems with individual modules end up in `stats.errors`; the remaining
/// modules are still emitted.
pub(crate) async fn compile(
    config: &BuildConfig,
    context: &Path,
    previous: Option<&PreviousBuild>,
) -> CompilationOutput {
    let started = Instant::now();
    let mut errors = Vec::new();
    let mut next_id = 0;
    let mut chunks = Vec::with_capacity(config.entry.len());

    for (name, items) in &config.entry {
        let mut modules = Vec::with_capacity(items.len());
        for item in items {
            match load_module(item, context).await {
                Ok(source) => {
                    modules.push(SourceModule {
                        id: next_id,
                        name: item.to_string(),
                        source,
                    });
                    next_id += 1;
                }
                Err(e) => errors.push(e.to_string()),
            }
        }

        let code = entry_chunk_code(config, name, &modules);
        chunks.push(Chunk {
            name: name.clone(),
            modules,
            code,
        });
    }

    let hash = compilation_hash(config, &chunks);
    let mut assets = AssetGraph::new();

    for chunk in &chunks {
        let code = if config.has_runtime_chunk() {
            chunk.code.clone()
        } else {
            format!("{}\n{}", runtime_code(config, &hash), chunk.code)
        };
        assets.insert(config.chunk_filename(&chunk.name, &hash), code);
    }

    if config.has_runtime_chunk() {
        assets.insert(
            config.chunk_filename(RUNTIME_CHUNK_NAME, &hash),
            runtime_code(config, &hash),
        );
    }

    if let Some(title) = config.html_shell_title() {
        assets.insert("index.html", html_shell(config, title, &chunks, &hash));
    }

    let build = PreviousBuild {
        hash: hash.clone(),
        chunk_hashes: chunks
            .iter()
            .map(|c| (c.name.clone(), content_hash(&c.code)))
            .collect(),
        chunk_modules: chunks
            .iter()
            .map(|c| (c.name.clone(), c.modules.iter().map(|m| m.id).collect()))
            .collect(),
    };

    if config.hot_enabled() {
        if let Some(previous) = previous.filter(|p| p.hash != hash) {
            emit_hot_update(&mut assets, &chunks, &build, previous);
        }
    }

    let stats = Stats {
        hash,
        time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        errors,
        warnings: Vec::new(),
        assets: assets
            .iter()
            .map(|(name, asset)| AssetInfo {
                name: name.to_string(),
                size: asset.content.len(),
            })
            .collect(),
        modules: chunks
            .iter()
            .flat_map(|chunk| {
                chunk.modules.iter().map(|m| ModuleInfo {
                    id: m.id,
                    name: m.name.clone(),
                    chunk: chunk.name.clone(),
                })
            })
            .collect(),
    };

    CompilationOutput {
        assets,
        stats,
        build,
    }
}

async fn load_module(item: &EntryItem, context: &Path) -> Result<String, BuildError> {
    match item {
        EntryItem::HotClient(options) => Ok(hot_client_code(options)),
        EntryItem::Module(request) => {
            let path = resolve_request(request, context);
            tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| match source.kind() {
                    std::io::ErrorKind::NotFound => BuildError::EntryNotFound {
                        request: request.clone(),
                        path: path.clone(),
                    },
                    _ => BuildError::ReadFailed {
                        path: path.clone(),
                        source,
                    },
                })
        }
    }
}

fn resolve_request(request: &str, context: &Path) -> PathBuf {
    let path = Path::new(request);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        context.join(request.strip_prefix("./").unwrap_or(request))
    }
}

fn hot_client_code(options: &HotClientOptions) -> String {
    HOT_CLIENT_JS
        .replace("__HMR_PATH__", &options.path)
        .replace("__HMR_TIMEOUT__", &options.timeout_ms.to_string())
        .replace("__HMR_RELOAD__", if options.reload { "true" } else { "false" })
}

fn runtime_code(config: &BuildConfig, hash: &str) -> String {
    let mut code = RUNTIME_JS
        .replace("__DEVPACK_MODE__", config.mode.as_str())
        .replace("__DEVPACK_HASH__", hash)
        .replace("__DEVPACK_PUBLIC_PATH__", &config.output.public_path);
    if config.hot_enabled() {
        code.push('\n');
        code.push_str(HOT_RUNTIME_JS);
    }
    code
}

fn module_table(modules: &[SourceModule]) -> String {
    let mut table = String::from("{\n");
    for module in modules {
        let _ = writeln!(
            table,
            "/* {} */\n{}: function (module, exports, __devpack_require__) {{\n{}\n}},",
            module.name, module.id, module.source
        );
    }
    table.push('}');
    table
}

fn entry_chunk_code(config: &BuildConfig, name: &str, modules: &[SourceModule]) -> String {
    let execute: Vec<String> = modules.iter().map(|m| m.id.to_string()).collect();
    let register = format!(
        "(self.__devpack_chunks__ = self.__devpack_chunks__ || []).push([{:?}, {}, [{}]]);",
        name,
        module_table(modules),
        execute.join(", ")
    );

    match config.output.library_target {
        LibraryTarget::Var => register,
        LibraryTarget::Umd => umd_wrap(name, &register),
    }
}

fn umd_wrap(name: &str, body: &str) -> String {
    format!(
        r#"(function (root, factory) {{
  if (typeof exports === "object" && typeof module === "object") module.exports = factory();
  else if (typeof define === "function" && define.amd) define([], factory);
  else if (typeof exports === "object") exports[{name:?}] = factory();
  else root[{name:?}] = factory();
}})(self, function () {{
{body}
  return self.__devpack_exports__ && self.__devpack_exports__[{name:?}];
}});
"#
    )
}

fn html_shell(config: &BuildConfig, title: &str, chunks: &[Chunk], hash: &str) -> String {
    let mut scripts = Vec::with_capacity(chunks.len() + 1);
    if config.has_runtime_chunk() {
        scripts.push(config.chunk_filename(RUNTIME_CHUNK_NAME, hash));
    }
    scripts.extend(chunks.iter().map(|c| config.chunk_filename(&c.name, hash)));

    let mut tags = String::new();
    for script in scripts {
        let _ = writeln!(
            tags,
            "    <script defer src=\"{}{}\"></script>",
            config.output.public_path, script
        );
    }

    format!(
        "<!DOCTYPE html>\n<html>\n  <head>\n    <meta charset=\"utf-8\">\n    <title>{}</title>\n    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n{}  </head>\n  <body>\n  </body>\n</html>\n",
        escape_html(title),
        tags
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn emit_hot_update(
    assets: &mut AssetGraph,
    chunks: &[Chunk],
    current: &PreviousBuild,
    previous: &PreviousBuild,
) {
    let updated: Vec<&Chunk> = chunks
        .iter()
        .filter(|c| previous.chunk_hashes.get(&c.name) != current.chunk_hashes.get(&c.name))
        .collect();

    let removed_chunks: Vec<&str> = previous
        .chunk_hashes
        .keys()
        .filter(|name| !current.chunk_hashes.contains_key(*name))
        .map(String::as_str)
        .collect();

    let mut current_ids: Vec<usize> = current.chunk_modules.values().flatten().copied().collect();
    current_ids.sort_unstable();
    let mut removed_modules: Vec<usize> = previous
        .chunk_modules
        .values()
        .flatten()
        .copied()
        .filter(|id| current_ids.binary_search(id).is_err())
        .collect();
    removed_modules.sort_unstable();

    let manifest = HotUpdateManifest {
        c: updated.iter().map(|c| c.name.as_str()).collect(),
        r: removed_chunks,
        m: removed_modules,
    };
    // Plain data, serialization cannot fail
    let manifest = serde_json::to_string(&manifest).unwrap_or_else(|_| "{}".to_string());
    assets.insert(format!("{}.hot-update.json", previous.hash), manifest);

    for chunk in updated {
        assets.insert(
            format!("{}.{}.hot-update.js", chunk.name, previous.hash),
            format!(
                "self.__devpack_hot_update__({:?}, {});\n",
                chunk.name,
                module_table(&chunk.modules)
            ),
        );
    }
}

fn compilation_hash(config: &BuildConfig, chunks: &[Chunk]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(config.mode.as_str().as_bytes());
    hasher.update(config.output.public_path.as_bytes());
    for chunk in chunks {
        hasher.update(chunk.name.as_bytes());
        hasher.update(chunk.code.as_bytes());
    }
    let mut hash = hasher.finalize().to_hex().to_string();
    hash.truncate(HASH_LENGTH);
    hash
}

fn content_hash(code: &str) -> String {
    let mut hash = blake3::hash(code.as_bytes()).to_hex().to_string();
    hash.truncate(HASH_LENGTH);
    hash
}
