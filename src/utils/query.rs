/// Escapes a user-provided value for Lucene-like query syntaxes such as
/// OpenFDA's `search=` parameter.
///
/// Every Lucene special character is escaped so a drug or disease name cannot
/// change the meaning of the query it is embedded in.
pub(crate) fn escape_lucene_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' | '+' | '-' | '!' | '(' | ')' | '{' | '}' | '[' | ']' | '^' | '"' | '~' | '*'
            | '?' | ':' | '/' | '&' | '|' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::escape_lucene_value;

    #[test]
    fn escapes_pharm_class_brackets_and_quotes() {
        let escaped = escape_lucene_value(r#"Nonsteroidal Anti-inflammatory Drug [EPC] "x""#);
        assert_eq!(
            escaped,
            r#"Nonsteroidal Anti\-inflammatory Drug \[EPC\] \"x\""#
        );
    }

    #[test]
    fn leaves_plain_names_untouched() {
        assert_eq!(escape_lucene_value("type 2 diabetes"), "type 2 diabetes");
    }
}
