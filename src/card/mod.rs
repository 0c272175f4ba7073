pub mod asset;
pub mod meta;
pub mod mime;
pub mod parsed;

// Re-exports for internal module use
pub use asset::{AssetLink, AssetType, ParsedAsset, ANIMATED_TAG};
pub use meta::{CardData, CardMeta, CardSpec, CardUpdate};
pub use parsed::{
    ParsedCharacter, ParsedCollection, ParsedCollectionMember, ParsedData, ParsedScenario,
};
