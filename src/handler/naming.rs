//! Default handler names derived from type names

/// Snake-case name of a type, without its module path or generic arguments.
///
/// `app::users::UserController` becomes `user_controller`.
pub fn handler_name_of<T: ?Sized>() -> String {
    to_snake_case(short_type_name(std::any::type_name::<T>()))
}

fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    let base = base.trim_start_matches('&');
    base.rsplit("::").next().unwrap_or(base)
}

/// Convert a CamelCase identifier to snake_case.
///
/// Acronyms stay together: `HTTPServer` becomes `http_server`.
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_uppercase() {
            out.push(c);
            continue;
        }

        let prev = i.checked_sub(1).and_then(|p| chars.get(p)).copied();
        let next = chars.get(i + 1).copied();
        let boundary = match prev {
            Some(p) if p != '_' => {
                p.is_lowercase()
                    || p.is_ascii_digit()
                    || (p.is_uppercase() && next.is_some_and(char::is_lowercase))
            }
            _ => false,
        };

        if boundary {
            out.push('_');
        }
        out.extend(c.to_lowercase());
    }

    out
}
