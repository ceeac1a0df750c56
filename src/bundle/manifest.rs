//! The slice of the Burn manifest that container extraction needs: payload
//! source paths inside the cabinets and the relative paths they must end up
//! at. Everything else in the document is ignored.

use serde::Deserialize;

/// <https://github.com/wixtoolset/wix/blob/main/src/wix/WixToolset.Core.Burn/Bundles/CreateBurnManifestCommand.cs>
#[derive(Debug, Deserialize)]
pub struct BurnManifest<'manifest> {
    #[serde(rename = "UX", borrow, default)]
    pub ux: UserExperience<'manifest>,
    #[serde(rename = "Payload", borrow, default)]
    pub payloads: Vec<Payload<'manifest>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserExperience<'manifest> {
    #[serde(rename = "Payload", borrow, default)]
    pub payloads: Vec<UxPayload<'manifest>>,
}

#[derive(Debug, Deserialize)]
pub struct UxPayload<'manifest> {
    #[serde(rename = "@Id")]
    pub id: &'manifest str,
    #[serde(rename = "@FilePath")]
    pub file_path: &'manifest str,
    #[serde(rename = "@SourcePath")]
    pub source_path: &'manifest str,
}

#[derive(Debug, Deserialize)]
pub struct Payload<'manifest> {
    #[serde(rename = "@Id")]
    pub id: &'manifest str,
    #[serde(rename = "@FilePath")]
    pub file_path: &'manifest str,
    #[serde(rename = "@SourcePath")]
    pub source_path: &'manifest str,
    #[serde(rename = "@Packaging", default)]
    pub packaging: Packaging,
    #[serde(rename = "@Container")]
    pub container: Option<&'manifest str>,
}

/// <https://github.com/wixtoolset/wix/blob/main/src/api/wix/WixToolset.Data/PackagingType.cs>
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Packaging {
    #[default]
    Unknown,
    Embedded,
    External,
}
