//! Placeholder templates
//!
//! Actions are written as `{{ pipeline }}`. A pipeline is one or more
//! commands joined by `|`; the result of each command is passed as the last
//! argument of the next.
//!
//! ```text
//! DATABASE_HOST={{ .Configs.databaseHost }}
//! password: {{ .Secrets.databasePassword | Base64Encode }}
//! author: {{ GitConfig "user.name" }}
//! ```
//!
//! Values are `.ContextName`, `.File.FileIn`, `.File.FileOut`,
//! `.Secrets.<name>`, `.Configs.<name>` and double quoted string literals.
//! Functions are `Base64Encode` and `GitConfig`.
//!
//! An action may span lines but ends at the first `}}`, so `}}` cannot
//! appear inside an action, not even within a string literal.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::{Captures, Regex};
use std::io::Write;
use std::process::Command;
use std::sync::OnceLock;

use super::RenderingContext;
use crate::error::{Result, SecretsError};

/// Renders a template source against a rendering context
pub trait TemplateEngine {
    fn render(
        &self,
        name: &str,
        source: &str,
        context: &RenderingContext,
        out: &mut dyn Write,
    ) -> Result<()>;
}

/// The built-in `{{ ... }}` template engine
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderTemplate;

fn action_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{\{(.*?)\}\}").unwrap())
}

impl PlaceholderTemplate {
    /// Render `source` to a string
    pub fn render_to_string(&self, source: &str, context: &RenderingContext) -> Result<String> {
        let mut error = None;
        let rendered = action_regex().replace_all(source, |caps: &Captures| {
            if error.is_some() {
                return String::new();
            }
            match eval_pipeline(&caps[1], context) {
                Ok(value) => value,
                Err(e) => {
                    error = Some(e);
                    String::new()
                }
            }
        });

        match error {
            Some(e) => Err(e),
            None => Ok(rendered.into_owned()),
        }
    }
}

impl TemplateEngine for PlaceholderTemplate {
    fn render(
        &self,
        name: &str,
        source: &str,
        context: &RenderingContext,
        out: &mut dyn Write,
    ) -> Result<()> {
        let rendered = self
            .render_to_string(source, context)
            .map_err(|e| SecretsError::Template(format!("{}: {}", name, e)))?;
        out.write_all(rendered.as_bytes())?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Field(String),
    Literal(String),
    Ident(String),
    Pipe,
}

fn template_error(msg: impl Into<String>) -> SecretsError {
    SecretsError::Template(msg.into())
}

fn tokenize(action: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = action.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '|' => {
                chars.next();
                tokens.push(Token::Pipe);
            }
            '"' => {
                chars.next();
                let mut literal = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some('n') => literal.push('\n'),
                            Some('t') => literal.push('\t'),
                            Some(other) => literal.push(other),
                            None => break,
                        },
                        other => literal.push(other),
                    }
                }
                if !closed {
                    return Err(template_error(format!("unterminated string in {{{{{}}}}}", action)));
                }
                tokens.push(Token::Literal(literal));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || c == '|' || c == '"' {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                if word.starts_with('.') {
                    tokens.push(Token::Field(word));
                } else {
                    tokens.push(Token::Ident(word));
                }
            }
        }
    }

    Ok(tokens)
}

fn eval_pipeline(action: &str, context: &RenderingContext) -> Result<String> {
    let tokens = tokenize(action)?;
    if tokens.is_empty() {
        return Err(template_error("empty action {{}}"));
    }

    let mut piped: Option<String> = None;
    for command in tokens.split(|t| *t == Token::Pipe) {
        piped = Some(eval_command(command, piped, context)?);
    }
    piped.ok_or_else(|| template_error("empty pipeline"))
}

fn eval_command(
    command: &[Token],
    piped: Option<String>,
    context: &RenderingContext,
) -> Result<String> {
    match command {
        [] => Err(template_error("missing command in pipeline")),
        [Token::Ident(function), args @ ..] => {
            let mut values = args
                .iter()
                .map(|arg| eval_value(arg, context))
                .collect::<Result<Vec<_>>>()?;
            values.extend(piped);
            call(function, &values)
        }
        [value] if piped.is_none() => eval_value(value, context),
        _ => Err(template_error(format!(
            "can't give argument to non-function {:?}",
            command[0]
        ))),
    }
}

fn eval_value(token: &Token, context: &RenderingContext) -> Result<String> {
    match token {
        Token::Literal(s) => Ok(s.clone()),
        Token::Field(path) => lookup(path, context),
        Token::Ident(name) => Err(template_error(format!(
            "function {} used as an argument",
            name
        ))),
        Token::Pipe => Err(template_error("unexpected |")),
    }
}

fn lookup(path: &str, context: &RenderingContext) -> Result<String> {
    let parts: Vec<&str> = path.trim_start_matches('.').split('.').collect();
    let found = match parts.as_slice() {
        ["ContextName"] => Some(context.context_name.clone()),
        ["File", "FileIn"] => Some(context.file.file_in.display().to_string()),
        ["File", "FileOut"] => Some(context.file.file_out.display().to_string()),
        ["Secrets", name] => context.secrets.get(*name).cloned(),
        ["Configs", name] => context.configs.get(*name).cloned(),
        _ => None,
    };
    found.ok_or_else(|| template_error(format!("{} is not defined", path)))
}

fn call(function: &str, args: &[String]) -> Result<String> {
    match (function, args) {
        ("Base64Encode", [value]) => Ok(STANDARD.encode(value)),
        ("GitConfig", [key]) => Ok(git_config(key)),
        ("Base64Encode" | "GitConfig", _) => Err(template_error(format!(
            "{} takes exactly one argument, got {}",
            function,
            args.len()
        ))),
        _ => Err(template_error(format!("function {} is not defined", function))),
    }
}

/// Value of a key in the local git config, or the error as text
fn git_config(key: &str) -> String {
    match Command::new("git")
        .args(["config", "--local", "--get", key])
        .output()
    {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        }
        Ok(output) => format!(
            "error: git config {} failed: {}",
            key,
            String::from_utf8_lossy(&output.stderr).trim()
        ),
        Err(e) => format!("error: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::FileToRender;
    use std::collections::BTreeMap;

    fn context() -> RenderingContext {
        let mut secrets = BTreeMap::new();
        secrets.insert("databasePassword".to_string(), "hunter2".to_string());
        let mut configs = BTreeMap::new();
        configs.insert("databaseHost".to_string(), "localhost".to_string());

        RenderingContext {
            context_name: "prod".to_string(),
            file: FileToRender::new("/project/.env.dist", "/project/.env"),
            secrets,
            configs,
        }
    }

    fn render(source: &str) -> Result<String> {
        PlaceholderTemplate.render_to_string(source, &context())
    }

    #[test]
    fn test_fields() {
        let out = render("{{.ContextName}}:{{ .Configs.databaseHost }}:{{ .Secrets.databasePassword }}")
            .unwrap();
        assert_eq!(out, "prod:localhost:hunter2");

        let out = render("{{ .File.FileIn }} -> {{ .File.FileOut }}").unwrap();
        assert_eq!(out, "/project/.env.dist -> /project/.env");
    }

    #[test]
    fn test_text_outside_actions_untouched() {
        let src = "# comment <b>&amp;</b>\nPASSWORD={{ .Secrets.databasePassword }}\n";
        assert_eq!(render(src).unwrap(), "# comment <b>&amp;</b>\nPASSWORD=hunter2\n");
    }

    #[test]
    fn test_base64_call_and_pipe() {
        assert_eq!(render(r#"{{ Base64Encode "hunter2" }}"#).unwrap(), "aHVudGVyMg==");
        assert_eq!(
            render("{{ .Secrets.databasePassword | Base64Encode }}").unwrap(),
            "aHVudGVyMg=="
        );
        assert_eq!(
            render("{{ Base64Encode .Secrets.databasePassword }}").unwrap(),
            "aHVudGVyMg=="
        );
    }

    #[test]
    fn test_string_literal_escapes() {
        assert_eq!(render(r#"{{ "a \"quoted\" word" }}"#).unwrap(), r#"a "quoted" word"#);
    }

    #[test]
    fn test_unknown_names_are_errors() {
        assert!(render("{{ .Secrets.missing }}").is_err());
        assert!(render("{{ .Nope }}").is_err());
        assert!(render("{{ Upper .ContextName }}").is_err());
        assert!(render("{{ }}").is_err());
        assert!(render(r#"{{ "open }}"#).is_err());
    }

    #[test]
    fn test_multi_line_action() {
        assert_eq!(
            render("PASS={{\n  .Secrets.databasePassword\n  | Base64Encode\n}}").unwrap(),
            "PASS=aHVudGVyMg=="
        );
    }

    #[test]
    fn test_closing_braces_end_action() {
        // the literal is cut at the first }}, leaving it unterminated
        assert!(render(r#"{{ "a}}b" }}"#).is_err());
    }

    #[test]
    fn test_wrong_arity() {
        assert!(render("{{ Base64Encode }}").is_err());
        assert!(render(r#"{{ Base64Encode "a" "b" }}"#).is_err());
        assert!(render(r#"{{ "a" | "b" }}"#).is_err());
    }

    #[test]
    fn test_render_writes_to_stream() {
        let mut out = Vec::new();
        PlaceholderTemplate
            .render("env", "host={{ .Configs.databaseHost }}", &context(), &mut out)
            .unwrap();
        assert_eq!(out, b"host=localhost");
    }

    #[test]
    fn test_render_error_names_template() {
        let mut out = Vec::new();
        let err = PlaceholderTemplate
            .render(".env.dist", "{{ .Secrets.missing }}", &context(), &mut out)
            .unwrap_err();
        assert!(err.to_string().contains(".env.dist"));
        assert!(out.is_empty());
    }
}
