//! Ambient global detection
//!
//! Names the execution environment provides without a declaration in the
//! bundle: language builtins, browser APIs the Elm runtime touches, and the
//! few Node.js names used in feature checks. A free reference to one of these
//! is never a dependency edge.

use rustc_hash::FxHashSet;

/// Builtins and host APIs assumed to exist wherever the output modules run
const AMBIENT_GLOBALS: &[&str] = &[
    // language values
    "undefined",
    "NaN",
    "Infinity",
    "arguments",
    "globalThis",
    "eval",
    // language builtins
    "Array",
    "ArrayBuffer",
    "BigInt",
    "Boolean",
    "DataView",
    "Date",
    "Error",
    "EvalError",
    "Float32Array",
    "Float64Array",
    "Function",
    "Int8Array",
    "Int16Array",
    "Int32Array",
    "Intl",
    "JSON",
    "Map",
    "Math",
    "Number",
    "Object",
    "Promise",
    "Proxy",
    "RangeError",
    "ReferenceError",
    "Reflect",
    "RegExp",
    "Set",
    "String",
    "Symbol",
    "SyntaxError",
    "TypeError",
    "URIError",
    "Uint8Array",
    "Uint8ClampedArray",
    "Uint16Array",
    "Uint32Array",
    "WeakMap",
    "WeakRef",
    "WeakSet",
    "decodeURI",
    "decodeURIComponent",
    "encodeURI",
    "encodeURIComponent",
    "escape",
    "isFinite",
    "isNaN",
    "parseFloat",
    "parseInt",
    "unescape",
    // timers and scheduling
    "cancelAnimationFrame",
    "clearInterval",
    "clearTimeout",
    "queueMicrotask",
    "requestAnimationFrame",
    "setInterval",
    "setTimeout",
    // browser
    "AbortController",
    "Blob",
    "CustomEvent",
    "Element",
    "Event",
    "File",
    "FileList",
    "FileReader",
    "FormData",
    "Headers",
    "HTMLElement",
    "KeyboardEvent",
    "MouseEvent",
    "MutationObserver",
    "Node",
    "Request",
    "Response",
    "TextDecoder",
    "TextEncoder",
    "URL",
    "XMLHttpRequest",
    "addEventListener",
    "alert",
    "console",
    "crypto",
    "document",
    "fetch",
    "getComputedStyle",
    "history",
    "innerHeight",
    "innerWidth",
    "localStorage",
    "location",
    "navigator",
    "pageXOffset",
    "pageYOffset",
    "performance",
    "removeEventListener",
    "scroll",
    "scrollTo",
    "self",
    "sessionStorage",
    "window",
    // CommonJS / Node.js feature checks
    "define",
    "exports",
    "global",
    "module",
    "process",
    "require",
];

/// The set of ambient names in effect for one run
#[derive(Debug, Clone)]
pub struct AmbientGlobals {
    names: FxHashSet<String>,
}

impl Default for AmbientGlobals {
    fn default() -> Self {
        Self::with_extra(std::iter::empty::<&str>())
    }
}

impl AmbientGlobals {
    /// Built-in list extended with configured names
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: FxHashSet<String> = AMBIENT_GLOBALS
            .iter()
            .map(|name| (*name).to_owned())
            .collect();
        names.extend(extra.into_iter().map(|name| name.as_ref().to_owned()));
        Self { names }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}
