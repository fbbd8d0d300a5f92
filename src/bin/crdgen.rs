//! Print the OpenLibertyApplication CRD as YAML
//!
//! Usage: `cargo run --bin crdgen > config/crd/openlibertyapplications.yaml`

use kube::CustomResourceExt;
use open_liberty_operator::crd::OpenLibertyApplication;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&OpenLibertyApplication::crd())?);
    Ok(())
}
