// SPDX-License-Identifier: MIT OR Apache-2.0
//! Default HTML document synthesis.

use std::collections::BTreeMap;

/// Id of the root element the module script mounts into.
const MOUNT_NODE_ID: &str = "panelhost-root";

/// Build the document served for a panel build.
///
/// If `existing_index_html` is `Some`, it is returned unchanged. Otherwise
/// synthesises a minimal
/// document with an import map (only when `externals` is non-empty), a
/// stylesheet link (only when `has_css`), a mount node, and a module
/// `<script>` referencing `bundle_file_name`.
#[must_use]
pub fn generate_html(
    existing_index_html: Option<&str>,
    externals: &BTreeMap<String, String>,
    has_css: bool,
    bundle_file_name: &str,
    css_file_name: &str,
) -> String {
    if let Some(existing) = existing_index_html {
        return existing.to_string();
    }

    let import_map = if externals.is_empty() {
        String::new()
    } else {
        let entries: Vec<String> = externals
            .iter()
            .map(|(spec, url)| format!("      {:?}: {:?}", spec, url))
            .collect();
        format!(
            "    <script type=\"importmap\">\n    {{\n      \"imports\": {{\n{}\n      }}\n    }}\n    </script>\n",
            entries.join(",\n")
        )
    };

    let stylesheet = if has_css {
        format!("    <link rel=\"stylesheet\" href=\"{css_file_name}\">\n")
    } else {
        String::new()
    };

    format!(
        "<!doctype html>\n\
         <html>\n\
         <head>\n\
         \x20   <meta charset=\"utf-8\">\n\
         \x20   <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         {import_map}\
         {stylesheet}\
         </head>\n\
         <body>\n\
         \x20   <div id=\"{MOUNT_NODE_ID}\"></div>\n\
         \x20   <script type=\"module\" src=\"{bundle_file_name}\"></script>\n\
         </body>\n\
         </html>\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_when_source_has_index_html() {
        let html = generate_html(Some("<html>custom</html>"), &BTreeMap::new(), false, "bundle.js", "bundle.css");
        assert_eq!(html, "<html>custom</html>");
    }

    #[test]
    fn default_document_omits_import_map_without_externals() {
        let html = generate_html(None, &BTreeMap::new(), false, "bundle.js", "bundle.css");
        assert!(!html.contains("importmap"));
        assert!(html.contains("panelhost-root"));
        assert!(html.contains("bundle.js"));
    }

    #[test]
    fn default_document_includes_import_map_with_externals() {
        let mut externals = BTreeMap::new();
        externals.insert("isomorphic-git".to_string(), "https://esm.sh/isomorphic-git@1?bundle".to_string());
        let html = generate_html(None, &externals, true, "bundle.js", "bundle.css");
        assert!(html.contains("importmap"));
        assert!(html.contains("isomorphic-git"));
        assert!(html.contains("bundle.css"));
    }
}
