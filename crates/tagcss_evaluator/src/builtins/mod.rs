//! The Node builtins a sandboxed module may `require`.

/// How a builtin module id is served inside the sandbox.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Builtin {
  /// Implemented by an embedded CommonJS polyfill.
  Polyfill(&'static str),
  /// Implemented by a browser polyfill package, resolved like any other dependency.
  Package(&'static str),
  /// `require` returns `null`.
  Empty,
  /// A Node builtin that cannot be used at compile time.
  Unsupported,
}

const POLYFILLS: &[(&str, &str)] = &[
  ("assert", include_str!("polyfills/assert.js")),
  ("console", include_str!("polyfills/console.js")),
  ("constants", include_str!("polyfills/constants.js")),
  ("events", include_str!("polyfills/events.js")),
  ("path", include_str!("polyfills/path.js")),
  ("process", include_str!("polyfills/process.js")),
  ("sys", include_str!("polyfills/util.js")),
  ("timers", include_str!("polyfills/timers.js")),
  ("util", include_str!("polyfills/util.js")),
];

const PACKAGES: &[(&str, &str)] = &[
  ("buffer", "buffer/"),
  ("crypto", "crypto-browserify"),
  ("domain", "domain-browser"),
  ("http", "stream-http"),
  ("https", "https-browserify"),
  ("os", "os-browserify/browser.js"),
  ("punycode", "punycode/"),
  ("querystring", "querystring-es3"),
  ("stream", "stream-browserify"),
  ("string_decoder", "string_decoder/"),
  ("tty", "tty-browserify"),
  ("url", "url/"),
  ("vm", "vm-browserify"),
  ("zlib", "browserify-zlib"),
];

const EMPTY: &[&str] = &[
  "child_process",
  "cluster",
  "dgram",
  "dns",
  "fs",
  "module",
  "net",
  "readline",
  "repl",
  "tls",
];

const UNSUPPORTED: &[&str] = &[
  "assert/strict",
  "async_hooks",
  "diagnostics_channel",
  "dns/promises",
  "fs/promises",
  "http2",
  "inspector",
  "path/posix",
  "path/win32",
  "perf_hooks",
  "readline/promises",
  "stream/consumers",
  "stream/promises",
  "stream/web",
  "timers/promises",
  "trace_events",
  "util/types",
  "v8",
  "wasi",
  "worker_threads",
];

/// Classifies `id`. Returns `None` for ids that are not builtins.
///
/// The returned name has the `node:` prefix stripped. Any `node:` id that is
/// not otherwise known is unsupported.
pub fn lookup(id: &str) -> Option<(&str, Builtin)> {
  let (name, prefixed) = match id.strip_prefix("node:") {
    Some(name) => (name, true),
    None => (id, false),
  };

  if let Some((_, code)) = POLYFILLS.iter().find(|(builtin, _)| *builtin == name) {
    return Some((name, Builtin::Polyfill(code)));
  }
  if let Some((_, package)) = PACKAGES.iter().find(|(builtin, _)| *builtin == name) {
    return Some((name, Builtin::Package(package)));
  }
  if EMPTY.contains(&name) {
    return Some((name, Builtin::Empty));
  }
  if prefixed || UNSUPPORTED.contains(&name) {
    return Some((name, Builtin::Unsupported));
  }
  None
}
