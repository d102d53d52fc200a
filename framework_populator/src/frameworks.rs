//! Canonical short names for target framework monikers.
//!
//! Framework folders inside a package (`lib/net45/`, `content/sl4-windowsphone71/`)
//! and `targetFramework` values in the manifest come in many spellings. Everything is
//! reduced to the short form already recorded in the store, so that declared and
//! recorded sets compare by plain string equality: lower-case identifier and version,
//! known profiles in their short spelling (`Client`, `wp71`) and other profiles as
//! written. Names that do not describe a known framework yield `None`; callers treat
//! those as framework-agnostic.

use lazy_regex::regex;

/// Frameworks whose versions keep their dots in the short form (`netstandard1.3`).
const DOTTED_VERSIONS: &[&str] = &["netstandard", "netcoreapp"];

/// Frameworks conventionally written with a single version digit (`sl4`, `win8`).
const SINGLE_DIGIT_VERSIONS: &[&str] = &["sl", "win", "wp"];

fn short_identifier(identifier: &str) -> Option<&'static str> {
    let short = match identifier {
        "net" | "netframework" | ".netframework" => "net",
        "netcore" | ".netcore" => "netcore",
        "win" | "windows" => "win",
        "wp" | "windowsphone" => "wp",
        "wpa" | "windowsphoneapp" => "wpa",
        "sl" | "silverlight" => "sl",
        "netmf" | ".netmicroframework" => "netmf",
        "netstandard" | ".netstandard" => "netstandard",
        "netcoreapp" | ".netcoreapp" => "netcoreapp",
        "uap" => "uap",
        "monoandroid" => "monoandroid",
        "monotouch" => "monotouch",
        "monomac" => "monomac",
        "xamarinios" | "xamarin.ios" => "xamarinios",
        "xamarinmac" | "xamarin.mac" => "xamarinmac",
        "native" => "native",
        "dnx" => "dnx",
        "dnxcore" => "dnxcore",
        "aspnet" | "asp.net" => "aspnet",
        "aspnetcore" | "asp.netcore" => "aspnetcore",
        "tizen" => "tizen",
        _ => return None,
    };
    Some(short)
}

/// Parses `4.5`, `45` or `451` into version components. Undotted digit runs
/// carry one component per digit.
fn version_components(version: &str) -> Option<Vec<u32>> {
    if version.contains('.') {
        version
            .split('.')
            .map(|c| c.parse::<u32>().ok())
            .collect()
    } else {
        version.chars().map(|c| c.to_digit(10)).collect()
    }
}

fn short_version(identifier: &str, version: &str) -> Option<String> {
    let mut components = version_components(version)?;
    if components.iter().all(|c| *c == 0) {
        return Some(String::new());
    }

    let dotted = DOTTED_VERSIONS.contains(&identifier) || components.iter().any(|c| *c > 9);
    let min_len = if SINGLE_DIGIT_VERSIONS.contains(&identifier) && !dotted {
        1
    } else {
        2
    };
    while components.len() < min_len {
        components.push(0);
    }
    while components.len() > min_len && components.last() == Some(&0) {
        components.pop();
    }
    let parts: Vec<String> = components.iter().map(|c| c.to_string()).collect();
    Some(if dotted {
        parts.join(".")
    } else {
        parts.concat()
    })
}

fn short_profile(profile: &str) -> String {
    let short = match profile.to_lowercase().as_str() {
        "client" => "Client",
        "full" => "Full",
        "compactframework" | "cf" => "cf",
        "windowsphone" | "wp" => "wp",
        "windowsphone71" | "wp71" => "wp71",
        _ => return profile.to_string(),
    };
    short.to_string()
}

fn short_portable_name(members: &str) -> Option<String> {
    let mut names = members
        .split('+')
        .map(short_single_name)
        .collect::<Option<Vec<_>>>()?;
    names.sort();
    names.dedup();
    Some(format!("portable-{}", names.join("+")))
}

fn short_single_name(name: &str) -> Option<String> {
    let re = regex!(r"(?i)^(\.?[a-z][a-z.]*?)(\d[\d.]*)?(?:-([a-z0-9]+))?$");
    let m = re.captures(name)?;

    let identifier = short_identifier(&m.get(1)?.as_str().to_lowercase())?;
    let version = match m.get(2) {
        Some(v) => short_version(identifier, v.as_str().trim_end_matches('.'))?,
        None => String::new(),
    };
    let profile = m
        .get(3)
        .map(|p| format!("-{}", short_profile(p.as_str())))
        .unwrap_or_default();

    Some(format!("{}{}{}", identifier, version, profile))
}

/// Returns the canonical short name for a framework folder or manifest value,
/// or `None` when it does not name a known framework.
pub fn short_framework_name(name: &str) -> Option<String> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    for prefix in ["portable-", ".netportable-"] {
        let matches = name
            .get(..prefix.len())
            .map_or(false, |p| p.eq_ignore_ascii_case(prefix));
        if matches {
            return short_portable_name(&name[prefix.len()..]);
        }
    }

    short_single_name(name)
}

#[cfg(test)]
mod tests {
    use super::short_framework_name;
    use test_case::test_case;

    #[test_case("net45", "net45")]
    #[test_case("NET45", "net45" ; "upper case")]
    #[test_case("net4.5", "net45")]
    #[test_case("net4", "net40")]
    #[test_case("net40", "net40")]
    #[test_case("net4.0.0.0", "net40")]
    #[test_case("net451", "net451")]
    #[test_case(".NETFramework4.5", "net45")]
    #[test_case("net40-Client", "net40-Client")]
    #[test_case("net40-client", "net40-Client" ; "known profile spelling")]
    #[test_case("NET40-Full", "net40-Full")]
    #[test_case("net45-MyProfile", "net45-MyProfile" ; "unknown profile kept as written")]
    #[test_case("netstandard1.3", "netstandard1.3")]
    #[test_case(".NETStandard1.3", "netstandard1.3" ; "long netstandard name")]
    #[test_case("netstandard13", "netstandard1.3")]
    #[test_case("netcoreapp2.0", "netcoreapp2.0")]
    #[test_case("sl4", "sl4")]
    #[test_case("sl40", "sl4")]
    #[test_case("sl4-windowsphone71", "sl4-wp71")]
    #[test_case("Silverlight4.0-WindowsPhone71", "sl4-wp71")]
    #[test_case("net35-CompactFramework", "net35-cf")]
    #[test_case("Silverlight5.0", "sl5")]
    #[test_case("wp8", "wp8")]
    #[test_case("win81", "win81")]
    #[test_case("wpa81", "wpa81")]
    #[test_case("uap10.0", "uap10.0")]
    #[test_case("MonoAndroid", "monoandroid")]
    #[test_case("monoandroid10", "monoandroid10")]
    #[test_case("Xamarin.iOS10", "xamarinios10")]
    #[test_case("native", "native")]
    #[test_case("portable-net45+win8", "portable-net45+win8")]
    #[test_case("portable-win8+net45+wp8", "portable-net45+win8+wp8" ; "portable members sorted")]
    #[test_case("portable-net4+sl5+net4.0", "portable-net40+sl5" ; "portable members deduplicated")]
    #[test_case("native0.0", "native" ; "zero version dropped")]
    fn test_short_framework_name(name: &str, expected: &str) {
        assert_eq!(short_framework_name(name).as_deref(), Some(expected));
    }

    #[test_case("" ; "empty")]
    #[test_case("   " ; "blank")]
    #[test_case("Scripts" ; "content folder")]
    #[test_case("en-US" ; "culture folder")]
    #[test_case("net4x" ; "bad version")]
    #[test_case("portable-net45+bogus1" ; "bad portable member")]
    #[test_case("45" ; "digits only")]
    fn test_unknown_framework_names(name: &str) {
        assert_eq!(short_framework_name(name), None);
    }
}
