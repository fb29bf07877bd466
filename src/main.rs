fn main() -> anyhow::Result<()> {
    foldernotes::cli::run()
}
