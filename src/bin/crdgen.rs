use kube::CustomResourceExt;
use splunk_k8s::crd::IndexerCluster;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&IndexerCluster::crd())?);
    Ok(())
}
