//! Cipher jobs run on the worker pool.

use std::sync::Arc;

use sealdrop_core::{SealdropError, SealdropResult};
use sealdrop_crypto::SealedChunk;

use crate::keyring::ChunkCipher;
use crate::pool::{PoolJob, WorkerPool};

pub type CipherPool = WorkerPool<CipherJob>;

#[derive(Debug)]
pub struct EncryptChunk {
    pub cipher: Arc<ChunkCipher>,
    pub index: u32,
    pub plaintext: Vec<u8>,
}

#[derive(Debug)]
pub struct DecryptChunk {
    pub cipher: Arc<ChunkCipher>,
    pub index: u32,
    /// `ciphertext || tag` as read from storage
    pub stored: Vec<u8>,
}

#[derive(Debug)]
pub enum CipherJob {
    EncryptChunk(EncryptChunk),
    DecryptChunk(DecryptChunk),
}

#[derive(Debug)]
pub enum CipherOutput {
    Encrypted { index: u32, sealed: SealedChunk },
    Decrypted { index: u32, plaintext: Vec<u8> },
}

impl CipherOutput {
    pub fn index(&self) -> u32 {
        match self {
            CipherOutput::Encrypted { index, .. } | CipherOutput::Decrypted { index, .. } => *index,
        }
    }

    pub fn into_sealed(self) -> SealdropResult<(u32, SealedChunk)> {
        match self {
            CipherOutput::Encrypted { index, sealed } => Ok((index, sealed)),
            CipherOutput::Decrypted { index, .. } => Err(SealdropError::Other(anyhow::anyhow!(
                "chunk {index}: expected ciphertext, worker returned plaintext"
            ))),
        }
    }

    pub fn into_plaintext(self) -> SealdropResult<(u32, Vec<u8>)> {
        match self {
            CipherOutput::Decrypted { index, plaintext } => Ok((index, plaintext)),
            CipherOutput::Encrypted { index, .. } => Err(SealdropError::Other(anyhow::anyhow!(
                "chunk {index}: expected plaintext, worker returned ciphertext"
            ))),
        }
    }
}

impl PoolJob for CipherJob {
    type Output = CipherOutput;

    fn run(self) -> SealdropResult<CipherOutput> {
        match self {
            CipherJob::EncryptChunk(job) => {
                let sealed = job.cipher.seal(job.index, job.plaintext)?;
                Ok(CipherOutput::Encrypted {
                    index: job.index,
                    sealed,
                })
            }
            CipherJob::DecryptChunk(job) => {
                let plaintext = job.cipher.open(job.index, job.stored)?;
                Ok(CipherOutput::Decrypted {
                    index: job.index,
                    plaintext,
                })
            }
        }
    }
}

impl CipherJob {
    pub fn encrypt(cipher: &Arc<ChunkCipher>, index: u32, plaintext: Vec<u8>) -> Self {
        CipherJob::EncryptChunk(EncryptChunk {
            cipher: Arc::clone(cipher),
            index,
            plaintext,
        })
    }

    pub fn decrypt(cipher: &Arc<ChunkCipher>, index: u32, stored: Vec<u8>) -> Self {
        CipherJob::DecryptChunk(DecryptChunk {
            cipher: Arc::clone(cipher),
            index,
            stored,
        })
    }
}
