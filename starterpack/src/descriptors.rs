//! Static repository tables and the SD card layout they stage into.

use crate::router::{ArchiveRule, ExtensionRule, PayloadMember, RoutingRule};
use crate::verify::VerificationTarget;
use std::path::PathBuf;

/// Loose firmware payloads loaded by Luma's chainloader.
pub const PAYLOADS_DIR: &str = "luma/payloads";
/// Installable title packages.
pub const CIAS_DIR: &str = "cias";
/// Homebrew Launcher executables.
pub const THREEDS_DIR: &str = "3ds";
pub const GM9_DIR: &str = "gm9";

/// One upstream project to track.
#[derive(Debug, Clone)]
pub struct RepositoryDescriptor {
    pub label: String,
    pub owner: String,
    pub repo: String,
    /// Filename suffixes; their order fixes the order of resolved assets.
    pub patterns: Vec<String>,
    pub rule: RoutingRule,
}

impl RepositoryDescriptor {
    pub fn new(label: &str, owner: &str, repo: &str, patterns: &[&str], rule: RoutingRule) -> Self {
        Self {
            label: label.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            rule,
        }
    }

    /// Cache key, `owner/repo`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Where an operator can fetch the assets by hand.
    pub fn releases_page(&self) -> String {
        format!("https://github.com/{}/{}/releases", self.owner, self.repo)
    }
}

/// Built-in descriptor tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Profile {
    /// Luma3DS, GodMode9 and the essential homebrew applications.
    Starter,
    /// Luma3DS, GodMode9 and the finalize helper payloads.
    Finalize,
}

impl Profile {
    pub fn descriptors(self) -> Vec<RepositoryDescriptor> {
        match self {
            Profile::Starter => {
                vec![
                    luma(),
                    RepositoryDescriptor::new(
                        "FBI",
                        "lifehackerhansol",
                        "FBI",
                        &[".cia", ".3dsx"],
                        starter_extension_rule(),
                    ),
                    RepositoryDescriptor::new(
                        "Homebrew Launcher Dummy",
                        "PabloMK7",
                        "homebrew_launcher_dummy",
                        &[".cia", ".3dsx"],
                        starter_extension_rule(),
                    ),
                    RepositoryDescriptor::new(
                        "Anemone3DS",
                        "astronautlevel2",
                        "Anemone3DS",
                        &[".cia", ".3dsx"],
                        starter_extension_rule(),
                    ),
                    RepositoryDescriptor::new(
                        "Checkpoint",
                        "bernardogiordano",
                        "checkpoint",
                        &[".cia", ".3dsx"],
                        starter_extension_rule(),
                    ),
                    RepositoryDescriptor::new(
                        "FTPD",
                        "mtheall",
                        "ftpd",
                        &["ftpd.cia", "ftpd.3dsx"],
                        starter_extension_rule(),
                    ),
                    RepositoryDescriptor::new(
                        "Universal-Updater",
                        "Universal-Team",
                        "Universal-Updater",
                        &[".cia", ".3dsx"],
                        starter_extension_rule(),
                    ),
                    godmode9("gm9/"),
                ]
            }
            Profile::Finalize => vec![
                luma(),
                godmode9("gm9/scripts/"),
                RepositoryDescriptor::new(
                    "Finalize",
                    "hacks-guide",
                    "finalize",
                    &["x_finalize_helper.firm", "finalize.romfs"],
                    RoutingRule::Extension(ExtensionRule::new(&[(".firm", PAYLOADS_DIR)])),
                ),
            ],
        }
    }

    /// Critical outputs checked after staging.
    pub fn verification(self) -> Vec<VerificationTarget> {
        let mut targets = vec![
            VerificationTarget::new("GodMode9.firm", format!("{PAYLOADS_DIR}/GodMode9.firm")),
            VerificationTarget::new("Luma's boot.firm", "boot.firm"),
        ];
        if self == Profile::Finalize {
            targets.push(VerificationTarget::new(
                "x_finalize_helper.firm",
                format!("{PAYLOADS_DIR}/x_finalize_helper.firm"),
            ));
            targets.push(VerificationTarget::new("finalize.romfs", "finalize.romfs"));
        }
        targets
    }

    /// Subdirectories created under the staging root before routing.
    pub fn directories(self) -> Vec<PathBuf> {
        let dirs: &[&str] = match self {
            Profile::Starter => &[CIAS_DIR, THREEDS_DIR, PAYLOADS_DIR, GM9_DIR],
            Profile::Finalize => &[PAYLOADS_DIR, GM9_DIR],
        };
        dirs.iter().map(PathBuf::from).collect()
    }
}

fn luma() -> RepositoryDescriptor {
    RepositoryDescriptor::new(
        "Luma3DS",
        "LumaTeam",
        "Luma3DS",
        &[".zip"],
        RoutingRule::Archive(ArchiveRule::extract_all()),
    )
}

fn godmode9(subtree: &str) -> RepositoryDescriptor {
    RepositoryDescriptor::new(
        "GodMode9",
        "d0k3",
        "GodMode9",
        &[".zip"],
        RoutingRule::Archive(ArchiveRule {
            payload: Some(PayloadMember::new(
                "GodMode9.firm",
                format!("{PAYLOADS_DIR}/GodMode9.firm"),
            )),
            subtree: Some(subtree.to_string()),
            extract_all: false,
        }),
    )
}

fn starter_extension_rule() -> RoutingRule {
    RoutingRule::Extension(ExtensionRule::new(&[
        (".cia", CIAS_DIR),
        (".3dsx", THREEDS_DIR),
    ]))
}
