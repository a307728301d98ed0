use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tera::{Context, Tera, Value};

const TEMPLATE_NAME: &str = "documentation";

#[derive(Serialize)]
struct PromptContext<'a> {
    path: &'a str,
    content: &'a str,
}

/// Renders the instructional prompt sent for each source file.
pub(crate) struct PromptTemplate {
    tera: Tera,
}

impl PromptTemplate {
    /// Creates a template engine, loading `override_path` instead of the
    /// built-in template when given.
    ///
    /// # Errors
    ///
    /// Returns an error if the template cannot be read or parsed.
    pub(crate) fn new(override_path: Option<&Path>) -> Result<Self> {
        let mut tera = Tera::default();

        match override_path {
            Some(path) => tera
                .add_template_file(path, Some(TEMPLATE_NAME))
                .map_err(|e| Error::template(path.display().to_string(), e))?,
            None => tera
                .add_raw_template(TEMPLATE_NAME, include_str!("../templates/documentation.tera"))
                .map_err(|e| Error::template(TEMPLATE_NAME, e))?,
        }

        tera.register_filter("detect_language", Self::detect_language_filter);

        Ok(Self { tera })
    }

    /// Builds the prompt for one file. The path becomes the title line.
    ///
    /// # Errors
    ///
    /// Returns an error if template rendering fails.
    pub(crate) fn render(&self, path: &Path, content: &str) -> Result<String> {
        let path = path.display().to_string();
        let context = Context::from_serialize(PromptContext {
            path: &path,
            content,
        })
        .map_err(|e| Error::template(TEMPLATE_NAME, e))?;

        self.tera
            .render(TEMPLATE_NAME, &context)
            .map_err(|e| Error::template(TEMPLATE_NAME, e))
    }

    /// Maps a file path to a markdown code-fence language name.
    fn detect_language_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
        let language = value
            .as_str()
            .and_then(|path| path.rsplit('.').next())
            .map_or("", |ext| match ext {
                "rs" => "rust",
                "py" => "python",
                "js" => "javascript",
                "ts" => "typescript",
                "go" => "go",
                "java" => "java",
                "c" | "h" => "c",
                "cpp" | "cc" | "cxx" | "hpp" => "cpp",
                "cs" => "csharp",
                "rb" => "ruby",
                "sh" | "bash" => "bash",
                "sql" => "sql",
                "yaml" | "yml" => "yaml",
                "toml" => "toml",
                "json" => "json",
                _ => "",
            });
        Ok(Value::String(language.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_builtin_prompt_starts_with_title() {
        let template = PromptTemplate::new(None).unwrap();
        let prompt = template
            .render(Path::new("src/app.py"), "def main():\n    pass\n")
            .unwrap();

        assert!(prompt.starts_with("src/app.py\n"));
        assert!(prompt.contains("def main():\n    pass"));
        assert!(prompt.contains("markdown"));
        assert!(prompt.contains("no preamble"));
    }

    #[test]
    fn test_content_is_not_interpreted() {
        let template = PromptTemplate::new(None).unwrap();
        let prompt = template
            .render(Path::new("t.py"), "x = '{{ not_a_var }}' < 3 & 4")
            .unwrap();

        assert!(prompt.contains("x = '{{ not_a_var }}' < 3 & 4"));
    }

    #[test]
    fn test_custom_template_override() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("custom.tera");
        file.write_str("Document {{ path }} ({{ path | detect_language }}):\n{{ content }}")
            .unwrap();

        let template = PromptTemplate::new(Some(file.path())).unwrap();
        let prompt = template.render(Path::new("lib.rs"), "fn f() {}").unwrap();

        assert_eq!(prompt, "Document lib.rs (rust):\nfn f() {}");
    }

    #[test]
    fn test_broken_custom_template() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("broken.tera");
        file.write_str("{{ path ").unwrap();

        assert!(matches!(
            PromptTemplate::new(Some(file.path())),
            Err(Error::Template { .. })
        ));
    }
}
