//! The code validator: a line-oriented syntactic filter for installed task
//! code. Not a semantic analyzer, and not a security boundary in the formal
//! sense — defense-in-depth ahead of the (purely textual) monkey header.

use regex::Regex;
use std::sync::OnceLock;
use surrogate_shared::SurrogateError;

/// Substrings that are never allowed to appear in a source line (outside of
/// comments), regardless of surrounding syntax.
const FORBIDDEN_TOKENS: &[&str] = &[
    "__subclasses__",
    "__class__",
    "__import__",
    "__builtins__",
    "__getattr__",
    "__getattribute__",
    "exec",
];

/// The closed set of modules user code is permitted to import.
const LEGAL_IMPORTS: &[&str] = &[
    "math",
    "PIL",
    "StringIO",
    "gdata.photos.service",
    "smtplib",
    "MimeWriter",
    "base64",
];

fn is_comment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[\t ]*#").expect("static regex is valid"))
}

fn re_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[\t ]*import[\t ]+([\w.]+)(?:[\t ]+as[\t ]+[\w.]+)?[\t ]*(?:#.*)?$")
            .expect("static regex is valid")
    })
}

fn re_from_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^[\t ]*from[\t ]+([\w.]+)[\t ]+import[\t ]+(?:[\w.]+(?:[\t ]+as[\t ]+[\w.]+)?[\t ]*,[\t ]*)*[\w.]+(?:[\t ]+as[\t ]+[\w.]+)?[\t ]*(?:#.*)?$",
        )
        .expect("static regex is valid")
    })
}

/// Validate a task's source code against the syntactic filter.
///
/// Returns `Ok(())` if every line either is a comment, contains none of the
/// forbidden tokens and no disallowed import, or matches one of the two
/// recognized import grammars against the module allow-list.
pub fn validate(code: &str) -> Result<(), SurrogateError> {
    for (idx, line) in code.lines().enumerate() {
        let lineno = idx + 1;

        if is_comment().is_match(line) {
            continue;
        }

        for token in FORBIDDEN_TOKENS {
            if line.contains(token) {
                return Err(SurrogateError::Validation(format!(
                    "Code contains illegal keyword {} on line #{}.",
                    token, lineno
                )));
            }
        }

        if line.contains("import") {
            let module = re_import()
                .captures(line)
                .or_else(|| re_from_import().captures(line))
                .map(|caps| caps[1].to_string());

            match module {
                Some(module) => {
                    if !LEGAL_IMPORTS.contains(&module.as_str()) {
                        return Err(SurrogateError::Validation(format!(
                            "Code imports: {}",
                            module
                        )));
                    }
                }
                None => {
                    return Err(SurrogateError::Validation(format!(
                        "Unrecognised (obfuscated?) import statement. {}",
                        line
                    )));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_legal_imports() {
        assert!(validate("import math").is_ok());
        assert!(validate("import math as m").is_ok());
        assert!(validate("from math import sin").is_ok());
        assert!(validate("from math import sin, cos, tan").is_ok());
        assert!(validate("from math import sin as s, cos as c").is_ok());
    }

    #[test]
    fn ignores_comments() {
        assert!(validate("    # import os\nimport math").is_ok());
    }

    #[test]
    fn rejects_illegal_import() {
        let err = validate("import os").unwrap_err();
        assert!(err.to_string().contains("os"));
    }

    #[test]
    fn rejects_obfuscated_import() {
        let err = validate("import math, os").unwrap_err();
        assert!(err.to_string().contains("Unrecognised"));
    }

    #[test]
    fn rejects_forbidden_tokens() {
        for token in FORBIDDEN_TOKENS {
            let src = format!("x = y.{}", token);
            let err = validate(&src).unwrap_err();
            assert!(err.to_string().contains(token));
        }
    }

    #[test]
    fn reports_line_number() {
        let src = "a = 1\nb = 2\nf.__class__";
        let err = validate(src).unwrap_err();
        assert!(err.to_string().contains("#3"));
    }
}
