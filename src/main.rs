#[tokio::main(flavor = "current_thread")]
async fn main() {
    let res = corecut::cli::run().await;
    if let Err(err) = res {
        corecut::clean_logger();
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
