/// Replace `${VAR}` and `${VAR:-fallback}` placeholders in raw config text.
///
/// Unset variables without a fallback are left untouched so the parse error
/// (if any) points at the original placeholder.
pub fn substitute_env(input: &str) -> String {
    substitute_with(input, |name| std::env::var(name).ok())
}

pub(crate) fn substitute_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated, emit literally.
            out.push_str(&rest[start..]);
            return out;
        };

        let expr = &after[..end];
        let (name, fallback) = match expr.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (expr, None),
        };

        match (lookup(name), fallback) {
            (Some(value), _) if !name.is_empty() => out.push_str(&value),
            (None, Some(fallback)) if !name.is_empty() => out.push_str(fallback),
            _ => {
                out.push_str("${");
                out.push_str(expr);
                out.push('}');
            },
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}
