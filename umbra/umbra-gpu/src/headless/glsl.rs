//! Minimal GLSL front end for the headless device: structural validation
//! and uniform reflection.

#[derive(Debug, Default, Clone)]
pub struct Reflection {
    pub uniforms: Vec<String>,
    pub blocks: Vec<String>,
}

fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('/', Some('/')) => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                    }
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn error(line: usize, message: &str) -> String {
    format!("ERROR: 0:{}: {}", line, message)
}

/// Returns the info log on failure.
pub fn validate(source: &str) -> Result<(), String> {
    if source.trim().is_empty() {
        return Err(error(0, "empty shader source"));
    }
    let code = strip_comments(source);
    let mut errors = Vec::new();
    let mut seen_code = false;
    for (n, line) in code.lines().enumerate() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("#error") {
            errors.push(error(n + 1, &format!("#error {}", rest.trim())));
        }
        if trimmed.starts_with("#version") {
            if seen_code {
                errors.push(error(n + 1, "#version must occur before anything else"));
            }
        } else if !trimmed.is_empty() {
            seen_code = true;
        }
    }
    let mut depth: i64 = 0;
    let mut parens: i64 = 0;
    for (n, line) in code.lines().enumerate() {
        for c in line.chars() {
            match c {
                '{' => depth += 1,
                '}' => depth -= 1,
                '(' => parens += 1,
                ')' => parens -= 1,
                _ => {}
            }
            if depth < 0 || parens < 0 {
                errors.push(error(n + 1, "unbalanced closing delimiter"));
                depth = depth.max(0);
                parens = parens.max(0);
            }
        }
    }
    if depth != 0 {
        errors.push(error(code.lines().count(), "unbalanced braces at end of source"));
    }
    if parens != 0 {
        errors.push(error(code.lines().count(), "unbalanced parentheses at end of source"));
    }
    let tokens = tokenize(&code);
    if !tokens.windows(2).any(|w| w[0] == "void" && w[1] == "main") {
        errors.push(error(0, "missing entry point `void main()`"));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("\n"))
    }
}

fn tokenize(code: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in code.chars() {
        if c.is_alphanumeric() || c == '_' {
            current.push(c);
        } else {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            if !c.is_whitespace() {
                tokens.push(c.to_string());
            }
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn is_identifier(token: &str) -> bool {
    token.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
}

/// Reflect `uniform` declarations and uniform blocks.
/// Assumes the source already passed [`validate`].
pub fn reflect(source: &str) -> Reflection {
    let code = strip_comments(source);
    let mut reflection = Reflection::default();
    let body: String = code
        .lines()
        .filter(|l| !l.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n");
    let tokens = tokenize(&body);
    let mut i = 0;
    while i < tokens.len() {
        if tokens[i] != "uniform" {
            i += 1;
            continue;
        }
        let Some(first) = tokens.get(i + 1) else { break };
        if tokens.get(i + 2).map(String::as_str) == Some("{") {
            reflection.blocks.push(first.clone());
            // Skip the block body; members are addressed through the block.
            let mut depth = 0;
            let mut j = i + 2;
            while j < tokens.len() {
                match tokens[j].as_str() {
                    "{" => depth += 1,
                    "}" => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    _ => {}
                }
                j += 1;
            }
            i = j + 1;
            continue;
        }
        // `uniform [precision] type name [, name]* ;`
        let mut j = i + 1;
        let mut names = Vec::new();
        let mut last_ident: Option<&String> = None;
        while j < tokens.len() && tokens[j] != ";" {
            match tokens[j].as_str() {
                "," => {
                    if let Some(name) = last_ident.take() {
                        names.push(name.clone());
                    }
                }
                "[" => {
                    if let Some(name) = last_ident.take() {
                        names.push(name.clone());
                    }
                    while j < tokens.len() && tokens[j] != "]" {
                        j += 1;
                    }
                }
                "=" => {
                    if let Some(name) = last_ident.take() {
                        names.push(name.clone());
                    }
                    while j < tokens.len() && tokens[j] != ";" && tokens[j] != "," {
                        j += 1;
                    }
                    continue;
                }
                t if is_identifier(t) => last_ident = Some(&tokens[j]),
                _ => {}
            }
            j += 1;
        }
        if let Some(name) = last_ident {
            names.push(name.clone());
        }
        for name in names {
            if !reflection.uniforms.contains(&name) {
                reflection.uniforms.push(name);
            }
        }
        i = j + 1;
    }
    reflection
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_reports_structure_errors() {
        assert!(validate("void main() {}").is_ok());
        assert!(validate("").unwrap_err().contains("empty"));
        assert!(validate("void main() { }}").unwrap_err().contains("unbalanced"));
        assert!(validate("void helper() {}").unwrap_err().contains("main"));
        let log = validate("#error missing define\nvoid main() {}").unwrap_err();
        assert!(log.starts_with("ERROR: 0:1: #error missing define"), "{}", log);
        assert!(validate("void f(;\nvoid main() {}").unwrap_err().contains("parentheses"));
    }

    #[test]
    fn version_directive_comes_first() {
        assert!(validate("// header\n\n#version 450 core\nvoid main() {}").is_ok());
        let log = validate("uniform float a;\n#version 450 core\nvoid main() {}").unwrap_err();
        assert!(log.contains("0:2: #version"), "{}", log);
    }

    #[test]
    fn comments_do_not_count() {
        assert!(validate("// }\nvoid main() { /* { */ }").is_ok());
        assert!(reflect("// uniform float hidden;\nvoid main() {}").uniforms.is_empty());
    }

    #[test]
    fn reflects_uniforms_and_blocks() {
        let src = "\
#version 450
#define MAX_LIGHTS 128
layout(binding = 0) uniform sampler2D input_tex;
uniform mat4 mat_model, mat_view;
uniform highp vec4 weights[4];
uniform int light_count = 0;
layout(std140) uniform LIGHTS_UBO
{
    vec4 lights[512];
};
void main() {}
";
        let r = reflect(src);
        assert_eq!(r.uniforms, vec!["input_tex", "mat_model", "mat_view", "weights", "light_count"]);
        assert_eq!(r.blocks, vec!["LIGHTS_UBO"]);
    }
}
