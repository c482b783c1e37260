//! 网格存储与拓扑

use std::collections::HashMap;

use super::{Triangle, Vertex, VertexId};
use crate::{Result, RigError};

/// 三角网格
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    vertices: Vec<Vertex>,
    triangles: Vec<Triangle>,
    index: HashMap<VertexId, usize>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从持久化数据重建
    pub fn from_parts(vertices: Vec<Vertex>, triangles: Vec<Triangle>) -> Result<Self> {
        let mut mesh = Self::new();
        mesh.vertices.reserve(vertices.len());
        for mut vertex in vertices {
            // 反序列化后的当前位置从绑定位置开始
            vertex.current_position = vertex.bind_position;
            mesh.add_vertex(vertex)?;
        }
        mesh.triangles.reserve(triangles.len());
        for triangle in triangles {
            mesh.add_triangle(triangle)?;
        }
        Ok(mesh)
    }

    pub fn add_vertex(&mut self, vertex: Vertex) -> Result<VertexId> {
        if self.index.contains_key(&vertex.id) {
            return Err(RigError::DuplicateVertex(vertex.id));
        }
        let id = vertex.id;
        self.index.insert(id, self.vertices.len());
        self.vertices.push(vertex);
        Ok(id)
    }

    pub fn add_triangle(&mut self, triangle: Triangle) -> Result<()> {
        let [a, b, c] = triangle.vertices;
        for id in triangle.vertices {
            if !self.index.contains_key(&id) {
                return Err(RigError::UnknownVertex(id));
            }
        }
        if a == b || a == c {
            return Err(RigError::DegenerateTriangle(a));
        }
        if b == c {
            return Err(RigError::DegenerateTriangle(b));
        }
        self.triangles.push(triangle);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.triangles.clear();
        self.index.clear();
    }

    // ========================================
    // 访问器
    // ========================================

    #[inline]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    #[inline]
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    #[inline]
    pub fn vertices_mut(&mut self) -> &mut [Vertex] {
        &mut self.vertices
    }

    #[inline]
    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    #[inline]
    pub fn index_of(&self, id: VertexId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.index_of(id).map(|i| &self.vertices[i])
    }

    pub fn vertex_mut(&mut self, id: VertexId) -> Option<&mut Vertex> {
        self.index_of(id).map(move |i| &mut self.vertices[i])
    }

    /// 三角形的顶点下标（渲染用）
    pub fn triangle_indices(&self) -> Vec<[usize; 3]> {
        self.triangles
            .iter()
            .filter_map(|t| {
                Some([
                    self.index_of(t.vertices[0])?,
                    self.index_of(t.vertices[1])?,
                    self.index_of(t.vertices[2])?,
                ])
            })
            .collect()
    }

    /// 顶点邻接表（按顶点下标，去重、有序）
    pub fn adjacency(&self) -> Vec<Vec<usize>> {
        let mut adjacency = vec![Vec::new(); self.vertices.len()];
        for [a, b, c] in self.triangle_indices() {
            for (x, y) in [(a, b), (b, c), (c, a)] {
                adjacency[x].push(y);
                adjacency[y].push(x);
            }
        }
        for list in &mut adjacency {
            list.sort_unstable();
            list.dedup();
        }
        adjacency
    }

    /// 当前位置恢复为绑定位置
    pub fn reset_to_bind_pose(&mut self) {
        for vertex in &mut self.vertices {
            vertex.current_position = vertex.bind_position;
        }
    }

    pub fn clear_weights(&mut self) {
        for vertex in &mut self.vertices {
            vertex.weights.clear();
        }
    }
}
