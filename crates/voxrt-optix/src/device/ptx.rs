//! Just enough PTX reading to answer "does this module export that entry point".

/// Names of every `.entry` declared in a PTX module, in declaration order
pub(crate) fn entry_points(source: &str) -> Vec<String> {
    source
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("//"))
        .filter_map(|line| {
            let (_, rest) = line.split_once(".entry")?;
            // `.entry` must be a whole directive, not a prefix of something else
            if !rest.starts_with(char::is_whitespace) {
                return None;
            }
            let name = rest
                .trim_start()
                .split(|c: char| c == '(' || c.is_whitespace())
                .next()?;
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::entry_points;

    #[test]
    fn finds_visible_entries() {
        let src = "
            .version 6.0
            .target sm_50
            // .entry commented_out(
            .global .align 4 .b8 output_buffer[1];
            .visible .entry trace_primary(
            )
            .entry exception()
            .visible .func helper(
        ";

        assert_eq!(entry_points(src), vec!["trace_primary", "exception"]);
    }

    #[test]
    fn ignores_entry_prefixes() {
        assert!(entry_points(".entryish foo(").is_empty());
    }
}
