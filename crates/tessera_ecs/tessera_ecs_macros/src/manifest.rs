use std::{env, fs, path::Path};

use toml_edit::{DocumentMut, Item, TableLike};

const ECS: &str = "tessera_ecs";
const FACADE: &str = "tessera";

/// How the crate being compiled reaches `tessera_ecs`.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum EcsDependency {
  /// Depends on the ECS crate itself, under the given name.
  Direct(String),
  /// Depends on the facade, which re-exports the ECS as its `ecs` module.
  Facade(String),
}

impl EcsDependency {
  /// Looks through `[dependencies]` and then `[dev-dependencies]`. A direct
  /// dependency wins over the facade within one table.
  pub(crate) fn from_manifest(manifest: &DocumentMut) -> Option<Self> {
    ["dependencies", "dev-dependencies"]
      .iter()
      .filter_map(|table| manifest.get(table)?.as_table_like())
      .find_map(find_in)
  }

  pub(crate) fn path(&self) -> syn::Path {
    let path = match self {
      EcsDependency::Direct(name) => name.clone(),
      EcsDependency::Facade(name) => format!("{}::ecs", name),
    };

    syn::parse_str(&path).unwrap_or_else(|_| panic!("Invalid crate path: {}", path))
  }
}

fn find_in(table: &dyn TableLike) -> Option<EcsDependency> {
  let mut facade = None;

  for (key, item) in table.iter() {
    let package = item.get("package").and_then(Item::as_str).unwrap_or(key);
    let name = key.replace('-', "_");

    match package.replace('-', "_").as_str() {
      ECS => return Some(EcsDependency::Direct(name)),
      FACADE => facade = Some(EcsDependency::Facade(name)),
      _ => {}
    }
  }

  facade
}

/// Path generated code uses for `tessera_ecs`. Falls back to the plain crate
/// name, which also covers the ECS crate's own tests and benches.
pub(crate) fn ecs_path() -> syn::Path {
  env::var_os("CARGO_MANIFEST_DIR")
    .map(|dir| Path::new(&dir).join("Cargo.toml"))
    .and_then(|manifest| fs::read_to_string(manifest).ok())
    .and_then(|manifest| manifest.parse::<DocumentMut>().ok())
    .and_then(|manifest| EcsDependency::from_manifest(&manifest))
    .unwrap_or_else(|| EcsDependency::Direct(ECS.to_string()))
    .path()
}
