fn main() -> anyhow::Result<()> {
    tetrad_cli::run()
}
