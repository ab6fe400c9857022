use anyhow::Result;

pub fn execute() -> Result<()> {
    println!("netmeter version {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}
