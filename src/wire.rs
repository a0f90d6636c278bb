// Copyright (C) 2019-2026 The Nodelink Authors
// This file is part of the nodelink-tcp crate.

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
// http://www.apache.org/licenses/LICENSE-2.0

// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Single place that knows how to put a frame header + filtered payload on
//! the wire and take one back off. Used by the handshake and by the
//! connection's reader/writer alike, so the framing logic exists exactly
//! once.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec::{FrameHeader, MessageType};
use crate::constants::FRAME_HEADER_SIZE;
use crate::error::Result;
use crate::iofilter::IoFilter;

pub async fn write_frame<S>(
    stream: &mut S,
    filter: &mut dyn IoFilter,
    payload: &[u8],
    message_type: MessageType,
    direct_ack: bool,
    message_id: u16,
) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let wrapped = filter.wrap(payload)?;
    let header = FrameHeader::new(wrapped.len() as u32, message_type, direct_ack, message_id)?;
    stream.write_all(&header.pack()?).await?;
    stream.write_all(&wrapped).await?;
    Ok(())
}

pub async fn read_frame<S>(stream: &mut S, filter: &mut dyn IoFilter) -> Result<(FrameHeader, Vec<u8>)>
where
    S: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; FRAME_HEADER_SIZE];
    stream.read_exact(&mut header_buf).await?;
    let header = FrameHeader::unpack(&header_buf)?;

    let mut raw = vec![0u8; header.length as usize];
    stream.read_exact(&mut raw).await?;
    let plaintext = filter.unwrap(&raw)?.to_vec();
    filter.done_reading();
    Ok((header, plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iofilter::PlainFilter;

    #[tokio::test]
    async fn frame_round_trips_over_a_duplex_pipe() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let mut filter_a = PlainFilter;
        let mut filter_b = PlainFilter;

        write_frame(&mut a, &mut filter_a, b"hello world", MessageType::Normal, true, 42).await.unwrap();
        let (header, payload) = read_frame(&mut b, &mut filter_b).await.unwrap();

        assert_eq!(payload, b"hello world");
        assert_eq!(header.message_type, MessageType::Normal);
        assert!(header.direct_ack);
        assert_eq!(header.message_id, 42);
    }
}
