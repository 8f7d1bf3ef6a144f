//! Face commands: enroll, match, edit and delete.

use clap::{Args, Subcommand};
use facematch_catalog::Profile;
use facematch_faceid::{EnrollHints, MatchPath};

use super::{load_image, load_vector, open_index, output_result, print_success};
use crate::Cli;

/// Person fields for a newly created identity.
#[derive(Args, Default)]
pub struct ProfileArgs {
    /// Full name
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub age: Option<u32>,

    #[arg(long)]
    pub gender: Option<String>,

    #[arg(long)]
    pub address: Option<String>,
}

impl From<&ProfileArgs> for Profile {
    fn from(a: &ProfileArgs) -> Self {
        Profile {
            full_name: a.name.clone(),
            age: a.age,
            gender: a.gender.clone(),
            address: a.address.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum FaceCommand {
    /// Enroll an embedding
    Add {
        /// Embedding file (JSON or YAML list of floats)
        vector: String,

        /// Enroll under this identity (created if missing)
        #[arg(long)]
        identity: Option<i64>,

        /// Use this image id instead of an assigned one
        #[arg(long)]
        image_id: Option<i64>,

        /// Face image file stored with the embedding
        #[arg(long)]
        image: Option<String>,

        /// Source path recorded with the embedding
        #[arg(long)]
        path: Option<String>,

        #[command(flatten)]
        profile: ProfileArgs,
    },

    /// Add a face to an existing identity
    AddFace {
        identity: i64,
        vector: String,

        #[arg(long)]
        image: Option<String>,

        #[arg(long)]
        path: Option<String>,
    },

    /// Nearest embeddings by cosine similarity
    Query {
        vector: String,

        /// Number of matches
        #[arg(short = 'k', long, default_value_t = 5)]
        top: usize,
    },

    /// Match a face, enrolling it when nothing is close enough
    Resolve {
        vector: String,

        /// Use the ingestion threshold instead of the lookup threshold
        #[arg(long)]
        ingest: bool,

        #[arg(long)]
        image: Option<String>,

        #[arg(long)]
        path: Option<String>,

        #[command(flatten)]
        profile: ProfileArgs,
    },

    /// Replace the embedding and/or path of an image
    Edit {
        image_id: i64,

        /// New embedding file
        #[arg(long)]
        vector: Option<String>,

        #[arg(long)]
        path: Option<String>,
    },

    /// Delete one image; deletes its identity when it was the last one
    DeleteImage { image_id: i64 },

    /// Delete an identity with all its faces
    DeleteIdentity { identity_id: i64 },

    /// Delete all faces of an identity and keep the identity
    RemoveFaces { identity_id: i64 },
}

impl FaceCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let (index, _) = open_index(cli)?;
        let out = cli.output.as_deref();

        match self {
            Self::Add {
                vector,
                identity,
                image_id,
                image,
                path,
                profile,
            } => {
                let hints = EnrollHints {
                    identity_id: *identity,
                    image_id: *image_id,
                    path: path.clone(),
                    image: load_image(image.as_deref())?,
                    profile: profile.into(),
                };
                let added = index.add(&load_vector(vector)?, hints)?;
                print_success(&format!(
                    "enrolled image {} as identity {}",
                    added.image_id, added.identity_id
                ));
                output_result(&added, out, cli.json)
            }
            Self::AddFace {
                identity,
                vector,
                image,
                path,
            } => {
                let added = index.add_face(
                    *identity,
                    &load_vector(vector)?,
                    load_image(image.as_deref())?,
                    path.clone(),
                )?;
                output_result(&added, out, cli.json)
            }
            Self::Query { vector, top } => {
                let matches = index.query(&load_vector(vector)?, *top)?;
                output_result(&matches, out, cli.json)
            }
            Self::Resolve {
                vector,
                ingest,
                image,
                path,
                profile,
            } => {
                let hints = EnrollHints {
                    path: path.clone(),
                    image: load_image(image.as_deref())?,
                    profile: profile.into(),
                    ..Default::default()
                };
                let match_path = if *ingest {
                    MatchPath::Ingest
                } else {
                    MatchPath::Primary
                };
                let resolution = index.resolve(&load_vector(vector)?, hints, match_path)?;
                output_result(&resolution, out, cli.json)
            }
            Self::Edit {
                image_id,
                vector,
                path,
            } => {
                let vector = vector.as_deref().map(load_vector).transpose()?;
                let edited = index.edit(*image_id, vector.as_deref(), path.as_deref())?;
                output_result(&edited, out, cli.json)
            }
            Self::DeleteImage { image_id } => {
                index.delete_image(*image_id)?;
                print_success(&format!("deleted image {image_id}"));
                Ok(())
            }
            Self::DeleteIdentity { identity_id } => {
                index.delete_identity(*identity_id)?;
                print_success(&format!("deleted identity {identity_id}"));
                Ok(())
            }
            Self::RemoveFaces { identity_id } => {
                let removed = index.remove_faces(*identity_id)?;
                output_result(&removed, out, cli.json)
            }
        }
    }
}
