use memshare::MemShare;
use smb2_compound::info::FileBasicInfo;
use smb2_compound::proto::attr;
use smb2_compound::{Share, ShareConfig};

use anyhow::{Context, Result};
use structopt::StructOpt;
use tracing::{debug, info};

#[derive(Debug, StructOpt)]
struct Args {
    #[structopt(name = "DIR", help = "Directory to run the walkthrough in")]
    dir: String,

    #[structopt(long, help = "Open every target with backup intent")]
    backup_intent: bool,

    #[structopt(long, help = "Encrypt every exchange")]
    encrypt: bool,

    #[structopt(long, help = "Never query the root through its cached handle")]
    no_root_cache: bool,

    #[structopt(long, help = "Remap characters reserved by Windows")]
    map_reserved_chars: bool,
}

fn setup_tracing() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::{
        layer::SubscriberExt,
        util::SubscriberInitExt,
        {fmt, EnvFilter},
    };

    tracing_subscriber::fmt()
        .event_format(fmt::format::Format::default().pretty())
        .with_env_filter(EnvFilter::from_default_env())
        .with_timer(fmt::time::ChronoLocal::rfc3339())
        .finish()
        .with(ErrorLayer::default())
        .init();
}

fn main() -> Result<()> {
    setup_tracing();
    let args = Args::from_args();
    async_std::task::block_on(run(args))?;
    Ok(())
}

#[allow(clippy::unit_arg)]
#[tracing::instrument(err)]
async fn run(args: Args) -> Result<()> {
    let mut config = ShareConfig::default();
    config
        .backup_intent(args.backup_intent)
        .encrypt(args.encrypt)
        .root_handle_cache(!args.no_root_cache)
        .map_reserved_chars(args.map_reserved_chars);

    let share = Share::new(MemShare::new(), config);
    let dir = args.dir.trim_matches('/');
    let file = format!("{}/file", dir);
    let link = format!("{}/link", dir);
    let renamed = format!("{}/renamed", dir);

    let root = share.query_path_info("/").await?;
    info!(links = root.info.number_of_links, directory = root.info.directory, "share root");

    share.mkdir(dir).await.context("mkdir")?;
    if let Some(attributes) = share.mkdir_setinfo(dir, attr::DIRECTORY).await {
        debug!(attributes, "directory marked read-only");
    }

    share
        .transport()
        .add_file(&file, b"hello")
        .await
        .map_err(|status| anyhow::anyhow!("seeding {}: {}", file, status))?;

    share.set_path_size(&file, 4096).await.context("truncate")?;
    let stamp = FileBasicInfo {
        last_write_time: 132_000_000_000_000_000,
        ..FileBasicInfo::default()
    };
    share.set_file_info(&file, &stamp).await.context("set times")?;
    share.create_hardlink(&file, &link).await.context("link")?;
    share.rename_path(&file, &renamed).await.context("rename")?;

    let out = share.query_path_info(&renamed).await?;
    info!(
        size = out.info.end_of_file,
        links = out.info.number_of_links,
        last_write = out.info.basic.last_write_time,
        symlink = out.symlink,
        "renamed file"
    );

    share.unlink(&renamed).await.context("unlink")?;
    share.unlink(&link).await.context("unlink")?;

    // the read-only bit only guards files, so the directory goes away
    share.rmdir(dir).await.context("rmdir")?;

    let stats = share.transport().stats();
    info!(
        compound = stats.compound_exchanges,
        direct = stats.direct_exchanges,
        encrypted = stats.encrypted_exchanges,
        "done"
    );
    Ok(())
}
