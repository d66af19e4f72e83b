//! Key derivation for rate limit buckets.

use serde_json::Value;

/// Separator placed between a base key and its argument suffix.
pub const SUFFIX_SEPARATOR: &str = ":";
/// Separator placed between arguments inside a suffix.
pub const ARGUMENT_SEPARATOR: &str = "/";

/// Generates rate limit keys from job identity and arguments
pub struct KeyGenerator;

impl KeyGenerator {
    /// Default key for a worker: its underscored type path followed by the queue.
    ///
    /// `app::workers::LolzWorker` on queue `meow` becomes `app:workers:lolz_worker:meow`.
    pub fn worker_key(worker: &str, queue: &str) -> String {
        format!("{}:{}", Self::underscore_path(worker), queue)
    }

    /// Converts a `::`-separated type path to lower snake case segments joined by `:`.
    /// Generic parameters are dropped.
    pub fn underscore_path(type_path: &str) -> String {
        let path = type_path.split('<').next().unwrap_or(type_path);
        path.split("::")
            .filter(|segment| !segment.is_empty())
            .map(Self::underscore)
            .collect::<Vec<_>>()
            .join(":")
    }

    /// `LolzWorker` -> `lolz_worker`, `HTTPWorker` -> `http_worker`.
    pub fn underscore(segment: &str) -> String {
        let chars: Vec<char> = segment.chars().collect();
        let mut out = String::with_capacity(segment.len() + 4);

        for (i, &c) in chars.iter().enumerate() {
            if !c.is_uppercase() {
                out.push(c);
                continue;
            }

            let prev = i.checked_sub(1).map(|j| chars[j]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };

            if boundary {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        }

        out
    }

    /// Extends `base` with the job's arguments so each argument set gets its own bucket.
    /// An empty argument list leaves the key unchanged.
    pub fn with_argument_suffix(base: &str, args: &[Value]) -> String {
        if args.is_empty() {
            return base.to_string();
        }

        format!(
            "{}{}{}",
            base,
            SUFFIX_SEPARATOR,
            Self::join_arguments(args, ARGUMENT_SEPARATOR)
        )
    }

    pub fn join_arguments(args: &[Value], separator: &str) -> String {
        args.iter()
            .map(Self::argument_to_string)
            .collect::<Vec<_>>()
            .join(separator)
    }

    /// Strings are used as-is, everything else in its JSON form.
    pub fn argument_to_string(arg: &Value) -> String {
        match arg {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}
