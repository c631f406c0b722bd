use {
    crate::{encryption::Cipher, remote::RemoteTree},
    anyhow::Result,
    blockhaus_protocol::Provider,
    byte_unit::{Byte, UnitType},
};

pub fn pretty_size(bytes: u64) -> String {
    format!(
        "{:.1}",
        Byte::from_u64(bytes).get_appropriate_unit(UnitType::Binary)
    )
}

/// Prints the decrypted remote listing, sorted by path.
pub async fn ls(provider: &impl Provider, cipher: &Cipher) -> Result<()> {
    let remote = RemoteTree::fetch(provider, cipher).await?;
    for (path, node) in &remote.tree {
        let mtime = node.mtime().format("%Y-%m-%d %H:%M:%S");
        if node.is_dir() {
            println!("{mtime}  {:>10}  {path}/", "-");
        } else {
            println!(
                "{mtime}  {:>10}  {path}",
                pretty_size(node.size().unwrap_or(0))
            );
        }
    }
    println!("{} items in total", remote.tree.len());
    Ok(())
}
