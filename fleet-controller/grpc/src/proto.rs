//! Messages exchanged with proxy agents over the command and file services.

/// Identifies a single message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MessageMeta {
    #[prost(string, tag = "1")]
    pub message_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub correlation_id: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "3")]
    pub timestamp: ::core::option::Option<::prost_types::Timestamp>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommandResponse {
    #[prost(enumeration = "command_response::CommandStatus", tag = "1")]
    pub status: i32,
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub error: ::prost::alloc::string::String,
}

pub mod command_response {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum CommandStatus {
        Unspecified = 0,
        Ok = 1,
        Error = 2,
        InProgress = 3,
        Failure = 4,
    }
}

// === Command service ===

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateConnectionRequest {
    #[prost(message, optional, tag = "1")]
    pub message_meta: ::core::option::Option<MessageMeta>,
    #[prost(message, optional, tag = "2")]
    pub resource: ::core::option::Option<Resource>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateConnectionResponse {
    #[prost(message, optional, tag = "1")]
    pub response: ::core::option::Option<CommandResponse>,
}

/// The container (or host) an agent runs in and the instances it manages.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Resource {
    #[prost(string, tag = "1")]
    pub resource_id: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub instances: ::prost::alloc::vec::Vec<Instance>,
    #[prost(message, optional, tag = "3")]
    pub container_info: ::core::option::Option<ContainerInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContainerInfo {
    #[prost(string, tag = "1")]
    pub container_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub hostname: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Instance {
    #[prost(message, optional, tag = "1")]
    pub instance_meta: ::core::option::Option<InstanceMeta>,
    #[prost(message, optional, tag = "2")]
    pub instance_config: ::core::option::Option<InstanceConfig>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InstanceMeta {
    #[prost(string, tag = "1")]
    pub instance_id: ::prost::alloc::string::String,
    #[prost(enumeration = "instance_meta::InstanceType", tag = "2")]
    pub instance_type: i32,
    #[prost(string, tag = "3")]
    pub version: ::prost::alloc::string::String,
}

pub mod instance_meta {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum InstanceType {
        Unspecified = 0,
        Agent = 1,
        Nginx = 2,
        NginxPlus = 3,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InstanceConfig {
    #[prost(message, optional, tag = "1")]
    pub agent_config: ::core::option::Option<AgentConfig>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AgentConfig {
    #[prost(message, repeated, tag = "1")]
    pub labels: ::prost::alloc::vec::Vec<::prost_types::Struct>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateDataPlaneStatusRequest {
    #[prost(message, optional, tag = "1")]
    pub message_meta: ::core::option::Option<MessageMeta>,
    #[prost(message, optional, tag = "2")]
    pub resource: ::core::option::Option<Resource>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateDataPlaneStatusResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateDataPlaneHealthRequest {
    #[prost(message, optional, tag = "1")]
    pub message_meta: ::core::option::Option<MessageMeta>,
    #[prost(message, repeated, tag = "2")]
    pub instance_healths: ::prost::alloc::vec::Vec<InstanceHealth>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InstanceHealth {
    #[prost(string, tag = "1")]
    pub instance_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub description: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateDataPlaneHealthResponse {}

/// Sent by the control plane over the subscription stream.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ManagementPlaneRequest {
    #[prost(message, optional, tag = "1")]
    pub message_meta: ::core::option::Option<MessageMeta>,
    #[prost(oneof = "management_plane_request::Request", tags = "2, 3")]
    pub request: ::core::option::Option<management_plane_request::Request>,
}

pub mod management_plane_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Request {
        #[prost(message, tag = "2")]
        ConfigApplyRequest(super::ConfigApplyRequest),
        #[prost(message, tag = "3")]
        ActionRequest(super::ApiActionRequest),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConfigApplyRequest {
    #[prost(message, optional, tag = "1")]
    pub overview: ::core::option::Option<FileOverview>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApiActionRequest {
    #[prost(string, tag = "1")]
    pub instance_id: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub action: ::core::option::Option<PlusAction>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PlusAction {
    #[prost(oneof = "plus_action::Action", tags = "1, 2")]
    pub action: ::core::option::Option<plus_action::Action>,
}

pub mod plus_action {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Action {
        #[prost(message, tag = "1")]
        UpdateHttpUpstreamServers(super::UpdateUpstreamServers),
        #[prost(message, tag = "2")]
        UpdateStreamServers(super::UpdateUpstreamServers),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateUpstreamServers {
    #[prost(string, tag = "1")]
    pub upstream: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub servers: ::prost::alloc::vec::Vec<::prost_types::Struct>,
}

/// Sent by the agent over the subscription stream.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataPlaneResponse {
    #[prost(message, optional, tag = "1")]
    pub message_meta: ::core::option::Option<MessageMeta>,
    #[prost(message, optional, tag = "2")]
    pub command_response: ::core::option::Option<CommandResponse>,
    #[prost(string, tag = "3")]
    pub instance_id: ::prost::alloc::string::String,
}

// === File service ===

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileMeta {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub hash: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub permissions: ::prost::alloc::string::String,
    #[prost(int64, tag = "4")]
    pub size: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct File {
    #[prost(message, optional, tag = "1")]
    pub file_meta: ::core::option::Option<FileMeta>,
    #[prost(bool, tag = "2")]
    pub unmanaged: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileOverview {
    #[prost(message, repeated, tag = "1")]
    pub files: ::prost::alloc::vec::Vec<File>,
    #[prost(message, optional, tag = "2")]
    pub config_version: ::core::option::Option<ConfigVersion>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConfigVersion {
    #[prost(string, tag = "1")]
    pub instance_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub version: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileContents {
    #[prost(bytes = "vec", tag = "1")]
    pub contents: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetFileRequest {
    #[prost(message, optional, tag = "1")]
    pub message_meta: ::core::option::Option<MessageMeta>,
    #[prost(message, optional, tag = "2")]
    pub file_meta: ::core::option::Option<FileMeta>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetFileResponse {
    #[prost(message, optional, tag = "1")]
    pub contents: ::core::option::Option<FileContents>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileDataChunk {
    #[prost(message, optional, tag = "1")]
    pub meta: ::core::option::Option<MessageMeta>,
    #[prost(oneof = "file_data_chunk::Chunk", tags = "2, 3")]
    pub chunk: ::core::option::Option<file_data_chunk::Chunk>,
}

pub mod file_data_chunk {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Chunk {
        #[prost(message, tag = "2")]
        Header(super::FileDataChunkHeader),
        #[prost(message, tag = "3")]
        Content(super::FileDataChunkContent),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileDataChunkHeader {
    #[prost(message, optional, tag = "1")]
    pub file_meta: ::core::option::Option<FileMeta>,
    #[prost(uint32, tag = "2")]
    pub chunks: u32,
    #[prost(uint32, tag = "3")]
    pub chunk_size: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileDataChunkContent {
    #[prost(uint32, tag = "1")]
    pub chunk_id: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub data: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetOverviewRequest {
    #[prost(message, optional, tag = "1")]
    pub message_meta: ::core::option::Option<MessageMeta>,
    #[prost(message, optional, tag = "2")]
    pub config_version: ::core::option::Option<ConfigVersion>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetOverviewResponse {
    #[prost(message, optional, tag = "1")]
    pub overview: ::core::option::Option<FileOverview>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateOverviewRequest {
    #[prost(message, optional, tag = "1")]
    pub message_meta: ::core::option::Option<MessageMeta>,
    #[prost(message, optional, tag = "2")]
    pub overview: ::core::option::Option<FileOverview>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateOverviewResponse {
    #[prost(message, optional, tag = "1")]
    pub overview: ::core::option::Option<FileOverview>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateFileRequest {
    #[prost(message, optional, tag = "1")]
    pub message_meta: ::core::option::Option<MessageMeta>,
    #[prost(message, optional, tag = "2")]
    pub file: ::core::option::Option<File>,
    #[prost(message, optional, tag = "3")]
    pub contents: ::core::option::Option<FileContents>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateFileResponse {}
