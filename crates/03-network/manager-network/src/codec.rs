//! 帧编解码：4 字节大端长度前缀 + JSON

use crate::protocol::Frame;
use manager_common::{ManagerError, ManagerResult};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// 读取一帧
///
/// 对端正常关闭时返回 `Ok(None)`。
pub async fn read_frame<R>(
    reader: &mut R,
    max_message_size: usize,
    buffer: &mut Vec<u8>,
) -> ManagerResult<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(ManagerError::network(format!("读取帧长度失败: {e}"))),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Err(ManagerError::network("空帧"));
    }
    if len > max_message_size {
        return Err(ManagerError::network(format!(
            "帧过大: {len} > {max_message_size}"
        )));
    }

    buffer.clear();
    buffer.resize(len, 0);
    reader
        .read_exact(&mut buffer[..])
        .await
        .map_err(|e| ManagerError::network(format!("读取帧内容失败: {e}")))?;

    serde_json::from_slice(&buffer[..])
        .map(Some)
        .map_err(|e| ManagerError::network(format!("帧不是合法的 JSON: {e}")))
}

/// 写出一帧
pub async fn write_frame<W>(
    writer: &mut W,
    frame: &Frame,
    max_message_size: usize,
) -> ManagerResult<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_vec(frame)
        .map_err(|e| ManagerError::network(format!("帧序列化失败: {e}")))?;
    if json.len() > max_message_size {
        return Err(ManagerError::network(format!(
            "帧过大: {} > {max_message_size}",
            json.len()
        )));
    }
    let len = u32::try_from(json.len())
        .map_err(|_| ManagerError::network(format!("帧长度超出 u32: {}", json.len())))?;

    writer
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| ManagerError::network(format!("写出帧长度失败: {e}")))?;
    writer
        .write_all(&json)
        .await
        .map_err(|e| ManagerError::network(format!("写出帧内容失败: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| ManagerError::network(format!("刷新连接失败: {e}")))
}
