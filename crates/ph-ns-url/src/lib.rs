// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! ph-ns-url
//!
//! Parser and emitter for the `ns://` address protocol that names
//! panel/worker sources. The scheme has an always-empty
//! authority; both `ns:///path` (empty authority, `/path`) and `ns://path`
//! (the leading segment folded into the path) are accepted on parse.
//!
//! `parse_ns_url(build_ns_url(source, opts)) == (source, opts)` for every
//! valid `(source, opts)` pair — this crate's round-trip law, exercised by
//! `tests/roundtrip.rs`.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

const PATH_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const VALUE_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Errors returned by [`parse_ns_url`].
#[derive(Debug, Error)]
pub enum NsUrlError {
    /// The URI did not use the `ns:` scheme.
    #[error("not an ns:// url: {0}")]
    InvalidScheme(String),
    /// The decoded source path was empty.
    #[error("empty source path")]
    EmptySource,
    /// `action` was present but not `navigate` or `child`.
    #[error("unknown action: {0}")]
    UnknownAction(String),
    /// `repoArgs`, `env`, or `stateArgs` was not valid JSON.
    #[error("malformed JSON in `{param}`: {source}")]
    MalformedJson {
        /// Which query parameter failed to parse.
        param: &'static str,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// `env` contained a non-string value.
    #[error("env value for `{0}` is not a string")]
    NonStringEnvValue(String),
    /// A query value was not valid percent-encoded UTF-8.
    #[error("invalid percent-encoding in `{0}`")]
    InvalidEncoding(&'static str),
}

/// `action` query parameter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NsAction {
    /// Navigate the current panel to this source (the default).
    #[default]
    Navigate,
    /// Open this source as a new child of the current panel.
    Child,
}

impl NsAction {
    fn parse(s: &str) -> Result<Self, NsUrlError> {
        match s {
            "navigate" => Ok(NsAction::Navigate),
            "child" => Ok(NsAction::Child),
            other => Err(NsUrlError::UnknownAction(other.to_string())),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            NsAction::Navigate => "navigate",
            NsAction::Child => "child",
        }
    }
}

/// One entry of the `repoArgs` map: either a bare repo identifier or an
/// object naming an explicit `ref`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(untagged)]
pub enum RepoArgSpec {
    /// A bare repo identifier string.
    Bare(String),
    /// An explicit `{repo, ref?}` object.
    Detailed {
        /// Repository identifier.
        repo: String,
        /// Optional ref (branch/tag/commit) within that repo.
        #[serde(default, skip_serializing_if = "Option::is_none", rename = "ref")]
        git_ref: Option<String>,
    },
}

/// The `unsafe` query parameter: `"true"`/`"false"` map to booleans, any
/// other value is treated as an opaque path string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(untagged)]
pub enum UnsafeArg {
    /// Explicit `true`/`false`.
    Bool(bool),
    /// Any other value, taken as a path.
    Path(String),
}

impl UnsafeArg {
    fn parse(s: &str) -> Self {
        match s {
            "true" => UnsafeArg::Bool(true),
            "false" => UnsafeArg::Bool(false),
            other => UnsafeArg::Path(other.to_string()),
        }
    }

    fn as_query_value(&self) -> String {
        match self {
            UnsafeArg::Bool(true) => "true".to_string(),
            UnsafeArg::Bool(false) => "false".to_string(),
            UnsafeArg::Path(p) => p.clone(),
        }
    }
}

/// The optional fields an `ns://` URI may carry, beyond its source path.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(default)]
pub struct NsUrlOpts {
    /// `action`; defaults to [`NsAction::Navigate`] when absent from the URI.
    pub action: NsAction,
    /// `gitRef` — branch/commit/tag to build at.
    pub git_ref: Option<String>,
    /// `templateSpec` — template identifier for scaffolding a new source.
    pub template_spec: Option<String>,
    /// `repoArgs` — per-dependency repo/ref overrides.
    pub repo_args: Option<BTreeMap<String, RepoArgSpec>>,
    /// `env` — environment variables passed to the panel/worker.
    pub env: Option<BTreeMap<String, String>>,
    /// `stateArgs` — opaque initial-state JSON.
    pub state_args: Option<serde_json::Value>,
    /// `name` — a caller-supplied display name override.
    pub name: Option<String>,
    /// `focus` — `Some(true)` only when the URI carried `focus=true`.
    pub focus: Option<bool>,
    /// `unsafe` — escape hatch for unsandboxed operation.
    pub unsafe_arg: Option<UnsafeArg>,
}

/// A fully parsed `ns://` address: decoded source plus options.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct NsAddress {
    /// The percent-decoded source path, e.g. `panels/editor`.
    pub source: String,
    /// Every optional field recognised on the URI.
    pub opts: NsUrlOpts,
}

impl fmt::Display for NsAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", build_ns_url(&self.source, &self.opts))
    }
}

/// Parse an `ns://` URI into its source path and options.
///
/// Accepts both `ns:///path` and `ns://path`, folding a leading authority
/// segment into the path in the latter case. Rejects non-`ns:` schemes, an
/// empty decoded source, an unrecognised `action`, and malformed JSON in
/// `repoArgs`/`env`/`stateArgs`.
///
/// # Errors
///
/// See [`NsUrlError`].
pub fn parse_ns_url(raw: &str) -> Result<NsAddress, NsUrlError> {
    let after_scheme = raw
        .strip_prefix("ns:")
        .ok_or_else(|| NsUrlError::InvalidScheme(raw.to_string()))?;
    let after_scheme = after_scheme
        .strip_prefix("//")
        .ok_or_else(|| NsUrlError::InvalidScheme(raw.to_string()))?;

    let (before_query, query_str) = match after_scheme.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (after_scheme, None),
    };

    // `ns:///path` has an empty authority and `/path`; `ns://path` folds the
    // leading segment into the path directly. Stripping at most one leading
    // slash normalises both forms to the same encoded path text.
    let path_enc = before_query.strip_prefix('/').unwrap_or(before_query);
    let source = percent_decode_str(path_enc)
        .decode_utf8()
        .map_err(|_| NsUrlError::InvalidEncoding("source"))?
        .into_owned();
    if source.is_empty() {
        return Err(NsUrlError::EmptySource);
    }

    let mut opts = NsUrlOpts::default();
    if let Some(query_str) = query_str {
        for pair in query_str.split('&').filter(|p| !p.is_empty()) {
            let (key, value_enc) = pair.split_once('=').unwrap_or((pair, ""));
            let value = percent_decode_str(value_enc)
                .decode_utf8()
                .map_err(|_| NsUrlError::InvalidEncoding("query value"))?
                .into_owned();
            match key {
                "action" => opts.action = NsAction::parse(&value)?,
                "gitRef" => opts.git_ref = Some(value),
                "templateSpec" => opts.template_spec = Some(value),
                "repoArgs" => {
                    let parsed: BTreeMap<String, RepoArgSpec> = serde_json::from_str(&value)
                        .map_err(|source| NsUrlError::MalformedJson {
                            param: "repoArgs",
                            source,
                        })?;
                    opts.repo_args = Some(parsed);
                }
                "env" => {
                    let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(&value)
                        .map_err(|source| NsUrlError::MalformedJson {
                        param: "env",
                        source,
                    })?;
                    let mut env = BTreeMap::new();
                    for (k, v) in raw {
                        match v {
                            serde_json::Value::String(s) => {
                                env.insert(k, s);
                            }
                            _ => return Err(NsUrlError::NonStringEnvValue(k)),
                        }
                    }
                    opts.env = Some(env);
                }
                "stateArgs" => {
                    let parsed: serde_json::Value = serde_json::from_str(&value).map_err(
                        |source| NsUrlError::MalformedJson {
                            param: "stateArgs",
                            source,
                        },
                    )?;
                    opts.state_args = Some(parsed);
                }
                "name" => opts.name = Some(value),
                "focus" => opts.focus = if value == "true" { Some(true) } else { None },
                "unsafe" => opts.unsafe_arg = Some(UnsafeArg::parse(&value)),
                _ => {
                    // Unrecognised parameters are ignored rather than rejected,
                    // so that future additive fields do not break old callers.
                }
            }
        }
    }

    Ok(NsAddress { source, opts })
}

/// Emit an `ns://` URI for `source` and `opts`.
///
/// `action=navigate` (the default) is always omitted; every other
/// parameter is omitted when absent. Path slashes in `source` are
/// preserved; every other reserved character is percent-encoded.
#[must_use]
pub fn build_ns_url(source: &str, opts: &NsUrlOpts) -> String {
    let encoded_source = utf8_percent_encode(source, PATH_SAFE);
    let mut url = format!("ns:///{encoded_source}");
    let mut params: Vec<String> = Vec::new();

    if opts.action != NsAction::Navigate {
        params.push(format!("action={}", opts.action.as_str()));
    }
    if let Some(git_ref) = &opts.git_ref {
        params.push(format!("gitRef={}", encode_value(git_ref)));
    }
    if let Some(template_spec) = &opts.template_spec {
        params.push(format!("templateSpec={}", encode_value(template_spec)));
    }
    if let Some(repo_args) = &opts.repo_args {
        if !repo_args.is_empty() {
            let json = serde_json::to_string(repo_args).expect("repoArgs always serializes");
            params.push(format!("repoArgs={}", encode_value(&json)));
        }
    }
    if let Some(env) = &opts.env {
        if !env.is_empty() {
            let json = serde_json::to_string(env).expect("env always serializes");
            params.push(format!("env={}", encode_value(&json)));
        }
    }
    if let Some(state_args) = &opts.state_args {
        let json = serde_json::to_string(state_args).expect("stateArgs always serializes");
        params.push(format!("stateArgs={}", encode_value(&json)));
    }
    if let Some(name) = &opts.name {
        params.push(format!("name={}", encode_value(name)));
    }
    if opts.focus == Some(true) {
        params.push("focus=true".to_string());
    }
    if let Some(unsafe_arg) = &opts.unsafe_arg {
        params.push(format!("unsafe={}", encode_value(&unsafe_arg.as_query_value())));
    }

    if !params.is_empty() {
        url.push('?');
        url.push_str(&params.join("&"));
    }
    url
}

fn encode_value(v: &str) -> String {
    utf8_percent_encode(v, VALUE_SAFE).to_string()
}
