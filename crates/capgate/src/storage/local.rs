//! 本地磁盘存储后端

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncWriteExt};

use crate::storage::Storage;

pub struct LocalStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalStorage {
    pub fn new(root: PathBuf, public_base_url: String) -> Result<Self> {
        if !root.exists() {
            std::fs::create_dir_all(&root).with_context(|| format!("创建存储目录失败: {}", root.display()))?;
        }
        Ok(Self {
            root,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl Storage for LocalStorage {
    async fn upload(
        &self,
        mut reader: Box<dyn AsyncRead + Send + Unpin>,
        path: &str,
        _content_type: &str,
    ) -> Result<String> {
        let target = self.root.join(path);
        if let Some(parent) = target.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut file = File::create(&target)
            .await
            .with_context(|| format!("创建文件失败: {}", target.display()))?;
        tokio::io::copy(&mut reader, &mut file)
            .await
            .with_context(|| format!("写入文件失败: {}", target.display()))?;
        file.flush().await?;

        Ok(self.url(path))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let target = self.root.join(path);
        if target.exists() {
            fs::remove_file(&target).await?;
        }
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base_url, path)
    }
}
