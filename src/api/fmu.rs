//! `.fmu` directory endpoints.

use super::{paths, ApiClient, ApiRequest};
use crate::errors::ClientError;
use crate::models::{FmuConfig, FmuDirPath, FmuProject, Message};

impl ApiClient {
    /// GET /api/v1/fmu/ - Nearest `.fmu` directory above the server's working directory.
    pub async fn get_cwd_fmu_directory(&self) -> Result<FmuProject, ClientError> {
        self.call(ApiRequest::get(paths::FMU)).await
    }

    /// POST /api/v1/fmu/ - Open the `.fmu` directory at `path`.
    pub async fn open_fmu_directory(&self, path: &FmuDirPath) -> Result<FmuConfig, ClientError> {
        self.call(ApiRequest::post(paths::FMU).with_json(path)?).await
    }

    /// POST /api/v1/fmu/init - Initialize `.fmu` at `path`.
    pub async fn init_fmu_directory(&self, path: &FmuDirPath) -> Result<FmuConfig, ClientError> {
        self.call(ApiRequest::post(paths::FMU_INIT).with_json(path)?).await
    }

    /// DELETE /api/v1/fmu/ - Close the directory session.
    pub async fn delete_fmu_directory(&self) -> Result<Message, ClientError> {
        self.call(ApiRequest::delete(paths::FMU)).await
    }
}
