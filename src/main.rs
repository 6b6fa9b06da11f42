use std::io::{self, BufRead as _, Write as _};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use fwupdate::archive::{decode_archive, decode_plaintext, ProductRecord};
use fwupdate::constants::product_code_for_id;
use fwupdate::transport::fake::FakeTransport;
use fwupdate::transport::gateway::GatewayClient;
use fwupdate::transport::logging::LoggingTransport;
use fwupdate::transport::Transport;
use fwupdate::upload::{upload_blob, UploadOutcome};
use fwupdate::{init_logger, log_info, UpdateError};

#[derive(Parser)]
#[command(name = "fwupdate")]
#[command(about = "Firmware update client for PE0653/PE0953 Z-Wave pool/spa controllers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decrypt a `.iboot` archive and write the plaintext to stdout.
    Decrypt { file: PathBuf },
    /// Parse a `.iboot` archive and print a summary of its products.
    Describe {
        file: PathBuf,
        #[arg(long)]
        write_ihex: bool,
        #[arg(long)]
        write_bin: bool,
    },
    /// Run the upload engine against the in-process device simulator.
    FakeUpload {
        file: PathBuf,
        #[arg(short, long)]
        debug: bool,
    },
    /// Upload firmware to a real device through the gateway.
    Upload {
        file: PathBuf,
        node_id: u32,
        mqtt_url: String,
        api_topic: String,
        #[arg(short, long)]
        debug: bool,
    },
    /// Run one diagnostic exchange and print the device's reported time.
    GetTime {
        node_id: u32,
        mqtt_url: String,
        api_topic: String,
        #[arg(short, long)]
        debug: bool,
    },
}


#[tokio::main]
async fn main() {
    init_logger();
    let cli = Cli::parse();

    let result = run(cli.command).await;
    match result {
        Ok(()) => std::process::exit(0),
        Err(CommandOutcome::Error(err)) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
        Err(CommandOutcome::Ambiguous(message)) => {
            println!("{message}");
            std::process::exit(1);
        }
    }
}

enum CommandOutcome {
    Error(UpdateError),
    Ambiguous(String),
}

impl From<UpdateError> for CommandOutcome {
    fn from(err: UpdateError) -> Self {
        CommandOutcome::Error(err)
    }
}

async fn run(command: Commands) -> Result<(), CommandOutcome> {
    match command {
        Commands::Decrypt { file } => decrypt(&file),
        Commands::Describe {
            file,
            write_ihex,
            write_bin,
        } => describe(&file, write_ihex, write_bin),
        Commands::FakeUpload { file, debug } => fake_upload(&file, debug).await,
        Commands::Upload {
            file,
            node_id,
            mqtt_url,
            api_topic,
            debug,
        } => upload(&file, node_id, &mqtt_url, &api_topic, debug).await,
        Commands::GetTime {
            node_id,
            mqtt_url,
            api_topic,
            debug,
        } => get_time(node_id, &mqtt_url, &api_topic, debug).await,
    }
}

/// Reads an archive file, mapping I/O failures onto the same `ArchiveError`
/// variant the decoder itself would raise for a read error.
fn read_archive_file(file: &Path) -> Result<Vec<u8>, CommandOutcome> {
    std::fs::read(file)
        .map_err(|e| CommandOutcome::Error(UpdateError::from(fwupdate::error::ArchiveError::from(e))))
}

fn decrypt(file: &Path) -> Result<(), CommandOutcome> {
    let ciphertext = read_archive_file(file)?;
    let plaintext = fwupdate::archive::cipher::decrypt_archive(&ciphertext).map_err(UpdateError::from)?;
    io::stdout().write_all(&plaintext).ok();
    Ok(())
}

fn describe(file: &Path, write_ihex: bool, write_bin: bool) -> Result<(), CommandOutcome> {
    let ciphertext = read_archive_file(file)?;
    let plaintext = fwupdate::archive::cipher::decrypt_archive(&ciphertext).map_err(UpdateError::from)?;
    let archive = decode_plaintext(&plaintext).map_err(UpdateError::from)?;

    println!("format version: {}", archive.format_version);
    for (code, product) in &archive.products {
        match product {
            ProductRecord::MetadataOnly { name, version, message } => {
                println!("  {code}: {name} v{version} ({message}) — no blob");
            }
            ProductRecord::Loaded {
                name,
                version,
                message,
                blob,
                blob_hash,
            } => {
                println!(
                    "  {code}: {name} v{version} ({message}) — {} bytes, sha256 {blob_hash}",
                    blob.len()
                );
                if write_ihex {
                    let path = sibling_path(file, code, "ihex");
                    std::fs::write(&path, fwupdate::archive::ihex::to_intel_hex(blob))
                        .map_err(|e| UpdateError::from(fwupdate::error::ArchiveError::from(e)))?;
                    log_info(&format!("wrote {}", path.display()));
                }
                if write_bin {
                    let path = sibling_path(file, code, "bin");
                    std::fs::write(&path, blob)
                        .map_err(|e| UpdateError::from(fwupdate::error::ArchiveError::from(e)))?;
                    log_info(&format!("wrote {}", path.display()));
                }
            }
        }
    }
    Ok(())
}

fn sibling_path(archive_path: &Path, product_code: &str, extension: &str) -> PathBuf {
    let stem = archive_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("firmware");
    archive_path
        .with_file_name(format!("{stem}-{product_code}.{extension}"))
}

async fn fake_upload(file: &Path, debug: bool) -> Result<(), CommandOutcome> {
    let ciphertext = read_archive_file(file)?;
    let archive = decode_archive(&ciphertext).map_err(UpdateError::from)?;

    let product = archive
        .products
        .get(fwupdate::constants::PRODUCT_CODE_RECEIVER)
        .ok_or_else(|| UpdateError::UnsupportedNode {
            manufacturer: fwupdate::constants::MANUFACTURER_ID,
            product_id: fwupdate::constants::PRODUCT_ID_RECEIVER,
        })?;
    let blob = product.blob().ok_or_else(|| UpdateError::UnsupportedNode {
        manufacturer: fwupdate::constants::MANUFACTURER_ID,
        product_id: fwupdate::constants::PRODUCT_ID_RECEIVER,
    })?;

    let outcome = if debug {
        let mut transport = LoggingTransport::new(FakeTransport::new());
        upload_blob(&mut transport, blob).await
    } else {
        let mut transport = FakeTransport::new();
        upload_blob(&mut transport, blob).await
    }
    .map_err(UpdateError::from)?;

    report_outcome(outcome)
}

async fn upload(
    file: &Path,
    node_id: u32,
    mqtt_url: &str,
    api_topic: &str,
    debug: bool,
) -> Result<(), CommandOutcome> {
    print!(r#"Proceed? [Enter "YES" to confirm] "#);
    io::stdout().flush().ok();
    let mut answer = String::new();
    io::stdin().read_line(&mut answer).ok();
    if answer.trim_end_matches(['\r', '\n']) != "YES" {
        return Err(CommandOutcome::Error(UpdateError::UserDeclined));
    }

    let ciphertext = read_archive_file(file)?;
    let archive = decode_archive(&ciphertext).map_err(UpdateError::from)?;

    let client = GatewayClient::connect(mqtt_url, api_topic, node_id)
        .await
        .map_err(UpdateError::from)?;
    let node_info = client.get_node_info(node_id).await.map_err(UpdateError::from)?;

    let product_code = product_code_for_id(node_info.product_id).ok_or(UpdateError::UnsupportedNode {
        manufacturer: node_info.manufacturer_id,
        product_id: node_info.product_id,
    })?;
    let product = archive
        .products
        .get(product_code)
        .ok_or(UpdateError::UnsupportedNode {
            manufacturer: node_info.manufacturer_id,
            product_id: node_info.product_id,
        })?;
    let blob = product.blob().ok_or(UpdateError::UnsupportedNode {
        manufacturer: node_info.manufacturer_id,
        product_id: node_info.product_id,
    })?;

    let outcome = if debug {
        let mut transport = LoggingTransport::new(client);
        upload_blob(&mut transport, blob).await
    } else {
        let mut transport = client;
        upload_blob(&mut transport, blob).await
    }
    .map_err(UpdateError::from)?;

    report_outcome(outcome)
}

fn report_outcome(outcome: UploadOutcome) -> Result<(), CommandOutcome> {
    match outcome {
        UploadOutcome::Confirmed => {
            log_info("upload confirmed by device");
            Ok(())
        }
        UploadOutcome::AssumedUploaded => Err(CommandOutcome::Ambiguous(
            "upload finished but the device's final confirmation never arrived; assumed uploaded"
                .to_string(),
        )),
    }
}

async fn get_time(
    node_id: u32,
    mqtt_url: &str,
    api_topic: &str,
    debug: bool,
) -> Result<(), CommandOutcome> {
    let client = GatewayClient::connect(mqtt_url, api_topic, node_id)
        .await
        .map_err(UpdateError::from)?;

    let reply = if debug {
        let mut transport = LoggingTransport::new(client);
        transport
            .send_and_receive(vec![fwupdate::constants::COMMAND_FIRMWARE_TRANSFER])
            .await
    } else {
        let mut transport = client;
        transport
            .send_and_receive(vec![fwupdate::constants::COMMAND_FIRMWARE_TRANSFER])
            .await
    }
    .map_err(UpdateError::from)?;

    let reply = reply.ok_or_else(|| {
        UpdateError::from(fwupdate::error::TransportError::MalformedResponse(
            "get-time exchange timed out".to_string(),
        ))
    })?;

    if reply.len() < 16 {
        return Err(CommandOutcome::Error(UpdateError::from(
            fwupdate::error::TransportError::MalformedResponse(
                "get-time reply shorter than 16 bytes".to_string(),
            ),
        )));
    }
    println!("{:02}:{:02}", reply[14], reply[15]);
    Ok(())
}
