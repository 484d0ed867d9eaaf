mod item;
mod metadata;
mod user;
mod workspace;

pub use item::{AbeComponent, AbeItemPayload, Chunk, Item, ItemVersion, VersionStatus};
pub use metadata::{CommitInfo, EncryptionMetadata, ItemMetadata};
pub use user::{Device, User};
pub use workspace::{
    AbeWorkspace, AttributeUniverse, MemberKeyMaterial, Workspace, WorkspaceCrypto,
    WorkspaceMember,
};
