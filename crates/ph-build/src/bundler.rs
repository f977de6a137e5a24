// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bundling: shells out to an external JS bundler
//! executable rather than embedding a JS toolchain, mirroring the
//! subprocess-facade idiom used by [`ph_git::GitProvisioner`] and
//! [`ph_deps::DependencyInstaller`].

use crate::error::BuildError;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

/// Which bundling profile to apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BundleTarget {
    /// Browser ES2022 ESM target with inline source maps.
    Panel,
    /// Node-like ES2022 ESM target without source maps.
    Worker,
}

/// Inputs to one bundling call.
pub struct BundleRequest<'a> {
    /// The target profile.
    pub target: BundleTarget,
    /// The runtime directory the wrapper entry and `node_modules` live in.
    pub runtime_dir: &'a Path,
    /// The wrapper entry file name, relative to `runtime_dir`.
    pub entry_file: &'a str,
    /// Specifiers excluded from the bundle.
    pub externals: &'a BTreeMap<String, String>,
    /// Whether the framework-integration dedup plugin should be installed.
    pub has_framework: bool,
}

/// Bundling output: JS text, and CSS text if any stylesheet was produced.
pub struct BundleOutput {
    /// The bundled JS text.
    pub bundle: String,
    /// The bundled CSS text, if the entry graph imported any stylesheets.
    pub css: Option<String>,
}

/// Produces [`BundleOutput`] for a [`BundleRequest`].
pub trait Bundler: Send + Sync {
    /// Run the bundler.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Bundle`] if the bundler subprocess fails or
    /// its output cannot be parsed.
    fn bundle(&self, request: &BundleRequest) -> Result<BundleOutput, BuildError>;
}

/// Default [`Bundler`]: writes a small Node driver script that invokes
/// esbuild's JS API (required for the `fs` redirection and
/// framework-dedup plugins, which the `esbuild` CLI alone cannot express)
/// and runs it via `node`.
#[derive(Debug, Clone)]
pub struct EsbuildBundler {
    node_bin: String,
}

impl Default for EsbuildBundler {
    fn default() -> Self {
        Self::new("node")
    }
}

impl EsbuildBundler {
    /// Create a bundler that shells out to `node_bin` to run the esbuild
    /// driver script.
    #[must_use]
    pub fn new(node_bin: impl Into<String>) -> Self {
        Self {
            node_bin: node_bin.into(),
        }
    }
}

impl Bundler for EsbuildBundler {
    fn bundle(&self, request: &BundleRequest) -> Result<BundleOutput, BuildError> {
        let driver_path = request.runtime_dir.join("__panelhost_esbuild_driver.mjs");
        let driver_source = render_driver_script(request);
        std::fs::write(&driver_path, driver_source)?;

        let out = Command::new(&self.node_bin)
            .arg(&driver_path)
            .current_dir(request.runtime_dir)
            .output()
            .map_err(|err| BuildError::Bundle(format!("failed to spawn {}: {err}", self.node_bin)))?;

        if !out.status.success() {
            return Err(BuildError::Bundle(
                String::from_utf8_lossy(&out.stderr).to_string(),
            ));
        }

        let stdout = String::from_utf8_lossy(&out.stdout);
        let parsed: serde_json::Value = serde_json::from_str(&stdout)
            .map_err(|err| BuildError::Bundle(format!("driver emitted non-JSON output: {err}")))?;

        let bundle = parsed
            .get("js")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| BuildError::Bundle("driver output missing `js`".to_string()))?
            .to_string();
        let css = parsed
            .get("css")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);

        Ok(BundleOutput { bundle, css })
    }
}

/// Render the Node driver script for one bundle request.
///
/// The script calls `esbuild.build` in-process (so plugins can be plain JS
/// closures) with `write: false`, then prints `{js, css}` as JSON on
/// stdout. Two plugins are always installed:
/// - a virtual `fs`/`fs/promises` redirector pointing at runtime stubs;
/// - (when `has_framework`) a dedup resolver for the framework-integration
///   package, short-circuiting on `resolveDir` to avoid infinite recursion.
fn render_driver_script(request: &BundleRequest) -> String {
    let (target_platform, sourcemap) = match request.target {
        BundleTarget::Panel => ("browser", "inline"),
        BundleTarget::Worker => ("neutral", "false"),
    };

    let externals_js: Vec<String> = request
        .externals
        .keys()
        .map(|spec| format!("{spec:?}"))
        .collect();

    let framework_plugin = if request.has_framework {
        format!(
            r#"
    {{
      name: "panelhost-framework-dedup",
      setup(build) {{
        const target = require.resolve({framework:?}, {{ paths: [process.cwd()] }});
        build.onResolve({{ filter: /^{framework_escaped}$/ }}, (args) => {{
          if (args.resolveDir === require("path").dirname(target)) {{
            return null;
          }}
          return {{ path: target }};
        }});
      }},
    }},"#,
            framework = crate::externals::FRAMEWORK_INTEGRATION_PACKAGE,
            framework_escaped = regex_escape(crate::externals::FRAMEWORK_INTEGRATION_PACKAGE),
        )
    } else {
        String::new()
    };

    format!(
        r#"const esbuild = require("esbuild");
const path = require("path");

const fsStubPlugin = {{
  name: "panelhost-fs-stub",
  setup(build) {{
    build.onResolve({{ filter: /^fs(\/promises)?$/ }}, (args) => ({{
      path: path.join(process.cwd(), "__panelhost_fs_stub.cjs"),
    }}));
  }},
}};

esbuild
  .build({{
    entryPoints: [{entry:?}],
    bundle: true,
    write: false,
    format: "esm",
    target: "es2022",
    platform: {target_platform:?},
    sourcemap: {sourcemap},
    external: [{externals_js}],
    plugins: [fsStubPlugin,{framework_plugin}],
  }})
  .then((result) => {{
    let js = "";
    let css = null;
    for (const file of result.outputFiles) {{
      if (file.path.endsWith(".css")) css = file.text;
      else js = file.text;
    }}
    process.stdout.write(JSON.stringify({{ js, css }}));
  }})
  .catch((err) => {{
    process.stderr.write(String(err && err.message ? err.message : err));
    process.exit(1);
  }});
"#,
        entry = request.entry_file,
        externals_js = externals_js.join(", "),
    )
}

fn regex_escape(input: &str) -> String {
    input
        .chars()
        .flat_map(|c| {
            if "\\^$.|?*+()[]{}".contains(c) {
                vec!['\\', c]
            } else {
                vec![c]
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_script_embeds_entry_and_externals() {
        let mut externals = BTreeMap::new();
        externals.insert("isomorphic-git".to_string(), "https://esm.sh/isomorphic-git@1?bundle".to_string());
        let request = BundleRequest {
            target: BundleTarget::Panel,
            runtime_dir: Path::new("/tmp/runtime"),
            entry_file: "__panelhost_entry.js",
            externals: &externals,
            has_framework: false,
        };
        let script = render_driver_script(&request);
        assert!(script.contains("__panelhost_entry.js"));
        assert!(script.contains("isomorphic-git"));
        assert!(script.contains("sourcemap: inline"));
        assert!(!script.contains("panelhost-framework-dedup"));
    }

    #[test]
    fn worker_target_disables_sourcemaps_and_uses_neutral_platform() {
        let externals = BTreeMap::new();
        let request = BundleRequest {
            target: BundleTarget::Worker,
            runtime_dir: Path::new("/tmp/runtime"),
            entry_file: "__panelhost_entry.js",
            externals: &externals,
            has_framework: false,
        };
        let script = render_driver_script(&request);
        assert!(script.contains("sourcemap: false"));
        assert!(script.contains("\"neutral\""));
    }

    #[test]
    fn framework_plugin_is_included_when_requested() {
        let externals = BTreeMap::new();
        let request = BundleRequest {
            target: BundleTarget::Panel,
            runtime_dir: Path::new("/tmp/runtime"),
            entry_file: "__panelhost_entry.js",
            externals: &externals,
            has_framework: true,
        };
        let script = render_driver_script(&request);
        assert!(script.contains("panelhost-framework-dedup"));
    }
}
