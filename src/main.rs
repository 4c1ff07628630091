use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use tokio::io::BufReader;
use tokio::net::TcpStream;

use blelink::transport::JsonLinesTransport;
use blelink::{Args, RunOptions, run};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let run_result = async {
        let options = RunOptions::builder()
            .maybe_log_level(args.log_level())
            .skip_initialize(args.skip_initialize())
            .build();

        match args.tcp().map(str::to_owned) {
            Some(bridge) => {
                let stream = TcpStream::connect(bridge.as_str()).await?;
                let (reader, writer) = stream.into_split();
                let transport = JsonLinesTransport::new(BufReader::new(reader), writer);
                run(args.into_command(), &mut std::io::stdout(), transport, options).await
            }
            // Wire frames own stdout, so human output moves to stderr.
            None => {
                let transport =
                    JsonLinesTransport::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout());
                let mut out = std::io::stderr();
                let result = run(args.into_command(), &mut out, transport, options).await;
                out.flush()?;
                result
            }
        }
    }
    .await;

    match run_result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}
