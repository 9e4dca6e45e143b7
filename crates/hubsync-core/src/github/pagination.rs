//! `Link` header pagination.

/// The `rel="next"` target of a `Link` header, if any.
///
/// `<https://api.github.com/...&page=2>; rel="next", <...>; rel="last"`
pub fn next_link(link_header: Option<&str>) -> Option<String> {
    link_header?.split(',').find_map(|part| {
        let mut segments = part.split(';');
        let target = segments.next()?.trim();
        let is_next = segments.any(|s| {
            let s = s.trim();
            s == "rel=\"next\"" || s == "rel=next"
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}
