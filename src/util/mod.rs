pub(crate) use self::chunk_reader::ChunkReader;

mod chunk_reader;
