//! Maintenance commands: inspect, list, reconcile and reset.

use clap::{Subcommand, ValueEnum};
use facematch_catalog::IdentityStore;
use facematch_faceid::{ListQuery, SortBy};
use serde::Serialize;

use super::{open_index, output_result, print_success};
use crate::Cli;

#[derive(Clone, Copy, ValueEnum)]
pub enum SortArg {
    ImageId,
    ImageIdDesc,
    IdentityId,
    IdentityIdDesc,
    Path,
    PathDesc,
}

impl From<SortArg> for SortBy {
    fn from(s: SortArg) -> Self {
        match s {
            SortArg::ImageId => SortBy::ImageIdAsc,
            SortArg::ImageIdDesc => SortBy::ImageIdDesc,
            SortArg::IdentityId => SortBy::IdentityIdAsc,
            SortArg::IdentityIdDesc => SortBy::IdentityIdDesc,
            SortArg::Path => SortBy::PathAsc,
            SortArg::PathDesc => SortBy::PathDesc,
        }
    }
}

#[derive(Subcommand)]
pub enum AdminCommand {
    /// Integrity statistics of the index
    Stats,

    /// List stored embeddings
    List {
        /// Only embeddings of this identity
        #[arg(long)]
        identity: Option<i64>,

        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long, default_value_t = 15)]
        page_size: usize,

        #[arg(long, value_enum, default_value = "image-id")]
        sort: SortArg,
    },

    /// First and last stored embeddings
    Peek {
        #[arg(short = 'n', default_value_t = 10)]
        n: usize,
    },

    /// Show an identity and its images
    Show { identity_id: i64 },

    /// Delete identities that own no faces
    Reconcile,

    /// Erase the index, every identity and every image
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Serialize)]
struct IdentityView {
    id: i64,
    full_name: String,
    age: Option<u32>,
    gender: Option<String>,
    address: Option<String>,
    has_avatar: bool,
    image_ids: Vec<i64>,
}

impl AdminCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let (index, catalog) = open_index(cli)?;
        let out = cli.output.as_deref();

        match self {
            Self::Stats => output_result(&index.stats(), out, cli.json),
            Self::List {
                identity,
                page,
                page_size,
                sort,
            } => {
                let page = index.list(&ListQuery {
                    identity_id: *identity,
                    page: *page,
                    page_size: *page_size,
                    sort: (*sort).into(),
                });
                output_result(&page, out, cli.json)
            }
            Self::Peek { n } => output_result(&index.peek(*n), out, cli.json),
            Self::Show { identity_id } => {
                let identity = catalog
                    .get(*identity_id)?
                    .ok_or_else(|| anyhow::anyhow!("identity {} not found", identity_id))?;
                let view = IdentityView {
                    id: identity.id,
                    full_name: identity.full_name,
                    age: identity.age,
                    gender: identity.gender,
                    address: identity.address,
                    has_avatar: identity.avatar.is_some(),
                    image_ids: index.image_ids_for_identity(*identity_id),
                };
                output_result(&view, out, cli.json)
            }
            Self::Reconcile => {
                let deleted = index.reconcile()?;
                print_success(&format!("deleted {} orphan identities", deleted.len()));
                output_result(&deleted, out, cli.json)
            }
            Self::Reset { yes } => {
                if !yes {
                    anyhow::bail!("reset erases every identity and face; pass --yes to confirm");
                }
                index.reset()?;
                print_success("index reset");
                Ok(())
            }
        }
    }
}
