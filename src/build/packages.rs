//! Pending package set and the apt command sequences built from it

use crate::config::definitions::PackageMap;
use crate::error::{StemmerError, StemmerResult};
use crate::recipe::RecipeCache;
use crate::rootfs::PACKAGE_STAGING_DIR;
use std::collections::BTreeSet;

/// Merge live recipes' package sets with the project's own packages
///
/// Later recipes override earlier ones and the project overrides all
/// recipes. Every name and constraint is validated.
pub fn merge<'a>(
    recipes: impl IntoIterator<Item = &'a RecipeCache>,
    project: &PackageMap,
) -> StemmerResult<PackageMap> {
    let mut merged = PackageMap::new();
    for recipe in recipes {
        merged.extend(recipe.packages().iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged.extend(project.iter().map(|(k, v)| (k.clone(), v.clone())));

    for (name, constraint) in &merged {
        validate(name, constraint)?;
    }
    Ok(merged)
}

/// Packages of `pending` that no recipe cache supplied
pub fn cache_misses(pending: &PackageMap, cached: &BTreeSet<String>) -> PackageMap {
    pending
        .iter()
        .filter(|(name, _)| !cached.contains(*name))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// apt-get argument for one package: `name` or `name=version`
pub fn install_spec(name: &str, constraint: &str) -> String {
    match constraint {
        "" | "*" => name.to_string(),
        version => format!("{}={}", name, version),
    }
}

/// Index update, install, list cleanup and archive cleanup
///
/// Downloaded archives go to the staging directory so they survive
/// `apt-get clean` and can be snapshotted into recipe caches. With no
/// packages, `install -f` only completes what `dpkg` left unconfigured.
pub fn install_commands(packages: &PackageMap) -> Vec<String> {
    let mut install = format!(
        "apt-get install -f --no-install-recommends -q -y -o Dir::Cache::Archives=/{}/",
        PACKAGE_STAGING_DIR
    );
    for (name, constraint) in packages {
        install.push(' ');
        install.push_str(&install_spec(name, constraint));
    }

    vec![
        "apt-get update".to_string(),
        install,
        "rm -fr /var/lib/apt/lists/*".to_string(),
        "apt-get clean".to_string(),
    ]
}

/// Install every archive in the staging directory from disk
pub fn apply_staged_command() -> String {
    format!("dpkg -i --force-depends /{}/*.deb", PACKAGE_STAGING_DIR)
}

/// Reject anything that is not a plain Debian package name or version
///
/// Both end up in a shell command line inside the chroot.
pub fn validate(name: &str, constraint: &str) -> StemmerResult<()> {
    let (base, qualifier) = match name.split_once(':') {
        Some((base, arch)) => (base, Some(arch)),
        None => (name, None),
    };

    let name_ok = base.len() >= 2
        && base
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        && base
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+-.".contains(c));
    if !name_ok {
        return Err(invalid(name, "not a valid Debian package name"));
    }

    if let Some(arch) = qualifier {
        let arch_ok = !arch.is_empty()
            && arch
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !arch_ok {
            return Err(invalid(name, "invalid architecture qualifier"));
        }
    }

    let version_ok = matches!(constraint, "" | "*")
        || (constraint.chars().next().is_some_and(|c| c.is_ascii_digit())
            && constraint
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || ".+~:-".contains(c)));
    if !version_ok {
        return Err(invalid(name, &format!("invalid version {:?}", constraint)));
    }

    Ok(())
}

fn invalid(name: &str, reason: &str) -> StemmerError {
    StemmerError::InvalidPackage {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}
